//! # Graphs
//!
//! A [`Graph`] is a named, ordered collection of nodes plus a precomputed
//! initialization order. Graphs are immutable once built; running one means
//! creating a [`Scope`](crate::scope::Scope) over it.
//!
//! Initialization order is topological over data-dependency edges: a node
//! that produces a data path initializes before every node that requires
//! it, so producers are bound before consumers attach behavior that reads
//! them. Control edges are never examined; control cycles (loops wired
//! back to earlier triggers) are legitimate. Nodes caught in a
//! data-dependency cycle keep their declaration order, which is sound
//! because data is pull-evaluated through thunks at invocation time.
//!
//! The [`GraphManager`] trait is the name-to-graph lookup used by nested
//! graph instantiation; [`GraphStore`] is the in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::node::{BoundaryRole, Node, NodeDescription};
use crate::spec::{NodeSpec, PortDirection, PortSpec};

/// An immutable named graph.
pub struct Graph {
  name: String,
  nodes: Vec<Arc<dyn Node>>,
  order: Vec<usize>,
}

impl Graph {
  /// Builds a graph and computes its initialization order.
  pub fn new(name: &str, nodes: Vec<Arc<dyn Node>>) -> Self {
    let order = initialization_order(&nodes);
    Self {
      name: name.to_string(),
      nodes,
      order,
    }
  }

  /// Returns the name of this graph.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Returns the nodes in declaration order.
  pub fn nodes(&self) -> &[Arc<dyn Node>] {
    &self.nodes
  }

  /// Returns the nodes in initialization order.
  pub fn initialization_order(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Node>> {
    self.order.iter().map(|&index| &self.nodes[index])
  }

  /// Flattens this graph's boundary markers into the descriptor of the
  /// composite node it presents when nested inside another graph.
  pub fn to_spec(&self) -> NodeSpec {
    let ports = self
      .nodes
      .iter()
      .filter_map(|node| node.boundary())
      .map(|boundary| {
        let direction = match boundary.role {
          BoundaryRole::ControlIn => PortDirection::ControlIn,
          BoundaryRole::ControlOut => PortDirection::ControlOut,
          BoundaryRole::DataIn => PortDirection::DataIn,
          BoundaryRole::DataOut => PortDirection::DataOut,
        };
        PortSpec::new(&boundary.name, &boundary.name, direction)
      })
      .collect();
    NodeSpec::new(&self.name, ports)
  }
}

/// Topological order over data-dependency edges, Kahn's algorithm with a
/// stable ascending-index tie break. Leftover nodes (data cycles) are
/// appended in declaration order.
fn initialization_order(nodes: &[Arc<dyn Node>]) -> Vec<usize> {
  let mut producer_of: HashMap<u32, usize> = HashMap::new();
  for (index, node) in nodes.iter().enumerate() {
    for id in node.productions() {
      producer_of.entry(id).or_insert(index);
    }
  }

  let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
  let mut indegree: Vec<usize> = vec![0; nodes.len()];
  let mut seen: HashSet<(usize, usize)> = HashSet::new();
  for (consumer, node) in nodes.iter().enumerate() {
    for id in node.requirements() {
      if let Some(&producer) = producer_of.get(&id) {
        if producer != consumer && seen.insert((producer, consumer)) {
          successors[producer].push(consumer);
          indegree[consumer] += 1;
        }
      }
    }
  }

  let mut ready: std::collections::BTreeSet<usize> = indegree
    .iter()
    .enumerate()
    .filter(|&(_, &degree)| degree == 0)
    .map(|(index, _)| index)
    .collect();
  let mut order = Vec::with_capacity(nodes.len());
  while let Some(index) = ready.pop_first() {
    order.push(index);
    for &successor in &successors[index] {
      indegree[successor] -= 1;
      if indegree[successor] == 0 {
        ready.insert(successor);
      }
    }
  }

  if order.len() < nodes.len() {
    let placed: HashSet<usize> = order.iter().copied().collect();
    let leftover: Vec<usize> = (0..nodes.len()).filter(|index| !placed.contains(index)).collect();
    warn!(
      nodes = leftover.len(),
      "data-dependency cycle, keeping declaration order for the cycle members"
    );
    order.extend(leftover);
  }
  order
}

/// Declarative form of a whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDescription {
  /// Graph name, also the type discriminator it is nested under.
  pub name: String,
  /// Node descriptions in declaration order.
  pub nodes: Vec<NodeDescription>,
}

/// Name-to-graph lookup shared across a scope tree.
pub trait GraphManager: Send + Sync {
  /// Resolves a graph by name.
  fn lookup(&self, name: &str) -> Option<Arc<Graph>>;
}

/// In-memory [`GraphManager`].
#[derive(Default)]
pub struct GraphStore {
  graphs: RwLock<HashMap<String, Arc<Graph>>>,
}

impl GraphStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a graph under its own name, replacing any previous graph
  /// with that name.
  pub fn insert(&self, graph: Arc<Graph>) {
    self
      .graphs
      .write()
      .unwrap()
      .insert(graph.name().to_string(), graph);
  }
}

impl GraphManager for GraphStore {
  fn lookup(&self, name: &str) -> Option<Arc<Graph>> {
    self.graphs.read().unwrap().get(name).cloned()
  }
}
