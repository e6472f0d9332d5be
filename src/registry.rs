//! # Node Registry
//!
//! Node types are claimed explicitly at startup: each registered type name
//! maps to a factory closure from description to node. Resolution of a
//! description's `type` field goes through the registry; names no factory
//! claims fall back to a graph reference under the same name, so composite
//! graphs nest by name without any registration of their own.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::GraphError;
use crate::graph::{Graph, GraphDescription};
use crate::node::{Node, NodeDescription};
use crate::nodes::control::{Branch, For, ForEach, Select};
use crate::nodes::data::{Cache, ValueNode};
use crate::nodes::entry::Entry;
use crate::nodes::list::{ListAdd, ListGet};
use crate::nodes::logic::{BooleanOp, Compare, CompareOp, Logical, Not};
use crate::nodes::map::{MapGet, MapSet};
use crate::nodes::math::{Absolute, Arithmetic, ArithmeticOp};
use crate::nodes::nesting::{ControlInput, ControlOutput, DataInput, DataOutput, Subgraph};
use crate::nodes::task::Wait;

type NodeFactory = Box<dyn Fn(&NodeDescription) -> Result<Arc<dyn Node>, GraphError> + Send + Sync>;

/// Startup-time mapping from type names to node factories.
#[derive(Default)]
pub struct NodeRegistry {
  factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
  /// An empty registry. Useful for tests and for embedders that bring
  /// their own taxonomy.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with every built-in node type claimed.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry.register(Entry::TYPE, |d| Ok(Arc::new(Entry::from_description(d)?)));
    registry.register(Wait::TYPE, |d| Ok(Arc::new(Wait::from_description(d)?)));
    registry.register(ValueNode::TYPE, |d| Ok(Arc::new(ValueNode::from_description(d)?)));
    registry.register(Cache::TYPE, |d| Ok(Arc::new(Cache::from_description(d)?)));
    for op in [
      ArithmeticOp::Add,
      ArithmeticOp::Subtract,
      ArithmeticOp::Multiply,
      ArithmeticOp::Divide,
    ] {
      registry.register(op.type_name(), move |d| {
        Ok(Arc::new(Arithmetic::from_description(op, d)?))
      });
    }
    registry.register(Absolute::TYPE, |d| Ok(Arc::new(Absolute::from_description(d)?)));
    for op in [
      CompareOp::Equal,
      CompareOp::NotEqual,
      CompareOp::LessThan,
      CompareOp::LessThanOrEqual,
      CompareOp::GreaterThan,
      CompareOp::GreaterThanOrEqual,
    ] {
      registry.register(op.type_name(), move |d| {
        Ok(Arc::new(Compare::from_description(op, d)?))
      });
    }
    for op in [BooleanOp::And, BooleanOp::Or] {
      registry.register(op.type_name(), move |d| {
        Ok(Arc::new(Logical::from_description(op, d)?))
      });
    }
    registry.register(Not::TYPE, |d| Ok(Arc::new(Not::from_description(d)?)));
    registry.register(ListGet::TYPE, |d| Ok(Arc::new(ListGet::from_description(d)?)));
    registry.register(ListAdd::TYPE, |d| Ok(Arc::new(ListAdd::from_description(d)?)));
    registry.register(MapGet::TYPE, |d| Ok(Arc::new(MapGet::from_description(d)?)));
    registry.register(MapSet::TYPE, |d| Ok(Arc::new(MapSet::from_description(d)?)));
    registry.register(Branch::TYPE, |d| Ok(Arc::new(Branch::from_description(d)?)));
    registry.register(Select::TYPE, |d| Ok(Arc::new(Select::from_description(d)?)));
    registry.register(For::TYPE, |d| Ok(Arc::new(For::from_description(d)?)));
    registry.register(ForEach::TYPE, |d| Ok(Arc::new(ForEach::from_description(d)?)));
    registry.register(ControlInput::TYPE, |d| Ok(Arc::new(ControlInput::from_description(d)?)));
    registry.register(ControlOutput::TYPE, |d| {
      Ok(Arc::new(ControlOutput::from_description(d)?))
    });
    registry.register(DataInput::TYPE, |d| Ok(Arc::new(DataInput::from_description(d)?)));
    registry.register(DataOutput::TYPE, |d| Ok(Arc::new(DataOutput::from_description(d)?)));
    registry
  }

  /// Claims a type name. A later registration under the same name replaces
  /// the earlier one.
  pub fn register<F>(&mut self, type_name: &str, factory: F)
  where
    F: Fn(&NodeDescription) -> Result<Arc<dyn Node>, GraphError> + Send + Sync + 'static,
  {
    self.factories.insert(type_name.to_string(), Box::new(factory));
  }

  /// Whether the given type name is claimed by a factory.
  pub fn contains(&self, type_name: &str) -> bool {
    self.factories.contains_key(type_name)
  }

  /// Resolves one description into a node.
  pub fn create(&self, description: &NodeDescription) -> Result<Arc<dyn Node>, GraphError> {
    match self.factories.get(&description.node_type) {
      Some(factory) => factory(description),
      None => {
        debug!(
          node_type = %description.node_type,
          "unclaimed node type, resolving as graph reference"
        );
        Ok(Arc::new(Subgraph::reference(description)))
      }
    }
  }

  /// Builds a graph from its declarative description.
  pub fn build(&self, description: &GraphDescription) -> Result<Graph, GraphError> {
    let nodes = description
      .nodes
      .iter()
      .map(|node| self.create(node))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Graph::new(&description.name, nodes))
  }

  /// Parses a json graph document and builds the graph.
  pub fn parse(&self, json: &str) -> Result<Graph, GraphError> {
    let description: GraphDescription = serde_json::from_str(json)?;
    self.build(&description)
  }
}
