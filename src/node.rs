//! # Node Trait and Descriptions
//!
//! A node is a unit of behavior bound to paths. Graph assembly turns raw
//! [`NodeDescription`]s into `Arc<dyn Node>` trait objects through the
//! node registry; the owning scope then drives the lifecycle:
//!
//! 1. `initialize` in topological order: attach callbacks to control
//!    paths, bind producers to data paths.
//! 2. `post_initialize` for every node, after all initializations.
//! 3. `launch` for entry nodes, spawning the graph's root activities.
//! 4. `shutdown` in reverse order when the scope tears down.
//!
//! Descriptions are untyped json objects with a `type` discriminator;
//! every other field is either a path id or a literal constant, and the
//! node's factory decides which is which based on its port layout.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::NodeSpec;
use crate::value::Value;

/// Role of a boundary marker inside a nested graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRole {
  ControlIn,
  ControlOut,
  DataIn,
  DataOut,
}

/// Boundary port exposed by a nesting marker node. The composite node that
/// instantiates the graph wires its outer ports against these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundarySpec {
  /// Port name the composite exposes.
  pub name: String,
  /// What kind of port it is on the composite.
  pub role: BoundaryRole,
  /// The path id inside the nested graph that the marker fronts.
  pub inner_id: PathId,
}

/// A unit of graph behavior.
#[async_trait]
pub trait Node: Send + Sync {
  /// Static descriptor of this node's type.
  fn spec(&self) -> NodeSpec;

  /// Data path ids this node reads. Drives initialization ordering.
  fn requirements(&self) -> Vec<PathId> {
    Vec::new()
  }

  /// Data path ids this node produces. Drives initialization ordering.
  fn productions(&self) -> Vec<PathId> {
    Vec::new()
  }

  /// Boundary port this node fronts, when it is a nesting marker.
  fn boundary(&self) -> Option<BoundarySpec> {
    None
  }

  /// Attaches this node's behavior to the paths of `scope`.
  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError>;

  /// Runs after every node in the scope has initialized.
  async fn post_initialize(&self, _scope: &Arc<Scope>) -> Result<(), GraphError> {
    Ok(())
  }

  /// Starts root activity on the scope. Only entry nodes do anything here;
  /// launching the same scope twice must not start a second activity.
  async fn launch(&self, _scope: &Arc<Scope>) {}

  /// Releases whatever this node holds for `scope`.
  async fn shutdown(&self, _scope: &Arc<Scope>) {}
}

/// Raw declarative description of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescription {
  /// Type discriminator, resolved through the node registry.
  #[serde(rename = "type")]
  pub node_type: String,
  /// Remaining fields, keyed by port key.
  #[serde(flatten)]
  pub fields: BTreeMap<String, serde_json::Value>,
}

impl NodeDescription {
  /// Builds a description programmatically.
  pub fn new(node_type: &str) -> Self {
    Self {
      node_type: node_type.to_string(),
      fields: BTreeMap::new(),
    }
  }

  /// Adds a field, consuming and returning the description.
  pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
    self.fields.insert(key.to_string(), value);
    self
  }

  /// Reads a required path id field.
  pub fn path_id(&self, key: &str) -> Result<PathId, GraphError> {
    self
      .opt_path_id(key)?
      .ok_or_else(|| GraphError::description(&self.node_type, format!("missing path id '{key}'")))
  }

  /// Reads an optional path id field.
  pub fn opt_path_id(&self, key: &str) -> Result<Option<PathId>, GraphError> {
    match self.fields.get(key) {
      None => Ok(None),
      Some(raw) => as_path_id(raw)
        .map(Some)
        .ok_or_else(|| GraphError::description(&self.node_type, format!("'{key}' is not a path id"))),
    }
  }

  /// Reads a dispatch table: a json object whose keys are literal values
  /// and whose entries are path ids. Keys parse as json literals where
  /// possible (`"1"` is the integer 1) and fall back to plain strings.
  pub fn path_table(&self, key: &str) -> Result<Vec<(Value, PathId)>, GraphError> {
    let Some(raw) = self.fields.get(key) else {
      return Ok(Vec::new());
    };
    let serde_json::Value::Object(entries) = raw else {
      return Err(GraphError::description(
        &self.node_type,
        format!("'{key}' is not a dispatch table"),
      ));
    };
    let mut table = Vec::with_capacity(entries.len());
    for (case, id) in entries {
      let id = as_path_id(id).ok_or_else(|| {
        GraphError::description(&self.node_type, format!("'{key}.{case}' is not a path id"))
      })?;
      let case = match serde_json::from_str::<serde_json::Value>(case) {
        Ok(literal) => Value::from_json(&literal),
        Err(_) => Value::String(case.clone()),
      };
      table.push((case, id));
    }
    Ok(table)
  }

  /// Reads a required literal constant field.
  pub fn constant(&self, key: &str) -> Result<Value, GraphError> {
    self
      .fields
      .get(key)
      .map(Value::from_json)
      .ok_or_else(|| GraphError::description(&self.node_type, format!("missing constant '{key}'")))
  }

  /// Reads a required string field.
  pub fn string(&self, key: &str) -> Result<String, GraphError> {
    match self.fields.get(key) {
      Some(serde_json::Value::String(text)) => Ok(text.clone()),
      _ => Err(GraphError::description(
        &self.node_type,
        format!("missing string '{key}'"),
      )),
    }
  }
}

fn as_path_id(raw: &serde_json::Value) -> Option<PathId> {
  raw.as_u64().and_then(|id| PathId::try_from(id).ok())
}
