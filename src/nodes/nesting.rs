//! # Graph Nesting
//!
//! A graph becomes reusable by exposing a boundary: marker nodes that
//! front one inner path each under a port name. The [`Subgraph`] node
//! instantiates such a graph inside another one, creating a child scope
//! per outer scope and wiring outer paths to inner paths 1:1 through the
//! boundary markers.
//!
//! Markers attach no behavior of their own; all wiring happens on the
//! outer side. An outer port left unbound leaves its inner path silent
//! (control) or undefined (data).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use crate::error::GraphError;
use crate::node::{BoundaryRole, BoundarySpec, Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::{Scope, ScopeId};
use crate::spec::{NodeSpec, PortDirection, PortSpec};

macro_rules! boundary_marker {
  ($(#[$doc:meta])* $name:ident, $type_name:literal, $role:expr, $key:literal, $direction:expr) => {
    $(#[$doc])*
    pub struct $name {
      name: String,
      path: PathId,
    }

    impl $name {
      pub const TYPE: &'static str = $type_name;

      pub fn new(name: &str, path: PathId) -> Self {
        Self {
          name: name.to_string(),
          path,
        }
      }

      pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
        Ok(Self::new(&description.string("name")?, description.path_id($key)?))
      }
    }

    #[async_trait]
    impl Node for $name {
      fn spec(&self) -> NodeSpec {
        NodeSpec::new(
          Self::TYPE,
          vec![
            PortSpec::new("Name", "name", PortDirection::Const),
            PortSpec::new(&self.name, $key, $direction),
          ],
        )
      }

      fn boundary(&self) -> Option<BoundarySpec> {
        Some(BoundarySpec {
          name: self.name.clone(),
          role: $role,
          inner_id: self.path,
        })
      }

      async fn initialize(&self, _scope: &Arc<Scope>) -> Result<(), GraphError> {
        Ok(())
      }
    }
  };
}

boundary_marker!(
  /// Boundary marker: an incoming control port of the enclosing graph,
  /// forwarded onto an inner control path.
  ControlInput,
  "ControlInput",
  BoundaryRole::ControlIn,
  "out",
  PortDirection::ControlOut
);

boundary_marker!(
  /// Boundary marker: an inner control path surfaced as an outgoing
  /// control port of the enclosing graph.
  ControlOutput,
  "ControlOutput",
  BoundaryRole::ControlOut,
  "in",
  PortDirection::ControlIn
);

boundary_marker!(
  /// Boundary marker: an incoming data port of the enclosing graph,
  /// produced onto an inner data path.
  DataInput,
  "DataInput",
  BoundaryRole::DataIn,
  "out",
  PortDirection::DataOut
);

boundary_marker!(
  /// Boundary marker: an inner data path surfaced as an outgoing data
  /// port of the enclosing graph.
  DataOutput,
  "DataOutput",
  BoundaryRole::DataOut,
  "in",
  PortDirection::DataIn
);

/// Instantiates a named graph as a node of this one.
///
/// Any node type the registry does not recognize resolves here: the type
/// name is taken as a graph name and every integer field as a boundary
/// binding. A name matching no registered graph leaves the node inert,
/// logged at initialization.
pub struct Subgraph {
  graph_name: String,
  bindings: BTreeMap<String, PathId>,
  children: Mutex<HashMap<ScopeId, Arc<Scope>>>,
}

impl Subgraph {
  pub fn new(graph_name: &str, bindings: BTreeMap<String, PathId>) -> Self {
    Self {
      graph_name: graph_name.to_string(),
      bindings,
      children: Mutex::new(HashMap::new()),
    }
  }

  /// Builds a reference to the graph named by the description's type,
  /// treating every integer field as a boundary binding.
  pub fn reference(description: &NodeDescription) -> Self {
    let bindings = description
      .fields
      .iter()
      .filter_map(|(key, raw)| {
        let id = raw.as_u64().and_then(|id| PathId::try_from(id).ok())?;
        Some((key.clone(), id))
      })
      .collect();
    Self::new(&description.node_type, bindings)
  }

  fn child(&self, scope_id: ScopeId) -> Option<Arc<Scope>> {
    self.children.lock().unwrap().get(&scope_id).cloned()
  }
}

#[async_trait]
impl Node for Subgraph {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(&self.graph_name, Vec::new())
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let Some(graph) = scope.manager().lookup(&self.graph_name) else {
      warn!(
        graph = %self.graph_name,
        "no node type or graph under this name, leaving node inert"
      );
      return Ok(());
    };

    let child = scope.sub_scope(graph.clone())?;
    for node in graph.nodes() {
      let Some(boundary) = node.boundary() else {
        continue;
      };
      let Some(&outer_id) = self.bindings.get(&boundary.name) else {
        continue;
      };
      let inner_id = boundary.inner_id;
      match boundary.role {
        BoundaryRole::ControlIn => {
          let inner = Arc::downgrade(&child);
          scope.control_path(outer_id).declare(move || {
            let inner = inner.clone();
            async move {
              match inner.upgrade() {
                Some(child) => child.control_path(inner_id).invoke().await,
                None => Ok(()),
              }
            }
          });
        }
        BoundaryRole::ControlOut => {
          let outer = Arc::downgrade(scope);
          child.control_path(inner_id).declare(move || {
            let outer = outer.clone();
            async move {
              match outer.upgrade() {
                Some(scope) => scope.control_path(outer_id).invoke().await,
                None => Ok(()),
              }
            }
          });
        }
        BoundaryRole::DataIn => {
          let outer = Arc::downgrade(scope);
          child.data_path(inner_id).set_thunk(move || {
            let outer = outer.clone();
            async move { live(&outer, outer_id)?.data_path(outer_id).get().await }
          })?;
        }
        BoundaryRole::DataOut => {
          let inner = Arc::downgrade(&child);
          scope.data_path(outer_id).set_thunk(move || {
            let inner = inner.clone();
            async move { live(&inner, inner_id)?.data_path(inner_id).get().await }
          })?;
        }
      }
    }
    self.children.lock().unwrap().insert(scope.id(), child);
    Ok(())
  }

  async fn post_initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    // The child initializes only after every sibling of this node has
    // bound its producers, so inner pulls through the boundary find the
    // outer side complete.
    match self.child(scope.id()) {
      Some(child) => child.initialize().await,
      None => Ok(()),
    }
  }

  async fn shutdown(&self, scope: &Arc<Scope>) {
    let child = self.children.lock().unwrap().remove(&scope.id());
    if let Some(child) = child {
      child.shutdown().await;
    }
  }
}
