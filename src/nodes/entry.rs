//! # Entry Nodes
//!
//! An entry is where execution starts: once its scope finishes
//! initializing, the entry spawns a scope-owned task that fires its
//! outgoing control path. Launching while a previous run of the same
//! scope is still in flight is a no-op; once that run completes the
//! marker is released and a later launch fires again. The spawned task
//! observes the scope's cancellation token so shutdown can reclaim it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use crate::error::GraphError;
use crate::node::{Node, NodeDescription};
use crate::path::PathId;
use crate::scope::{Scope, ScopeId};
use crate::spec::{NodeSpec, PortDirection, PortSpec};

/// Graph entry point.
pub struct Entry {
  out: PathId,
  launched: Arc<Mutex<HashSet<ScopeId>>>,
}

impl Entry {
  pub const TYPE: &'static str = "Entry";

  pub fn new(out: PathId) -> Self {
    Self {
      out,
      launched: Arc::new(Mutex::new(HashSet::new())),
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(description.path_id("out")?))
  }

  /// Whether a run of this entry is still in flight in the given scope.
  pub fn is_launched(&self, scope_id: ScopeId) -> bool {
    self.launched.lock().unwrap().contains(&scope_id)
  }
}

#[async_trait]
impl Node for Entry {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![PortSpec::new("Out", "out", PortDirection::ControlOut)],
    )
  }

  async fn initialize(&self, _scope: &Arc<Scope>) -> Result<(), GraphError> {
    Ok(())
  }

  async fn launch(&self, scope: &Arc<Scope>) {
    if !self.launched.lock().unwrap().insert(scope.id()) {
      return;
    }
    let launched = self.launched.clone();
    let scope_id = scope.id();
    let weak = Arc::downgrade(scope);
    let token = scope.cancellation().clone();
    let out = self.out;
    scope.spawn(async move {
      let run = async move {
        match weak.upgrade() {
          Some(scope) => scope.control_path(out).invoke().await,
          None => Ok(()),
        }
      };
      tokio::select! {
        _ = token.cancelled() => {}
        result = run => {
          if let Err(error) = result {
            warn!(%error, "entry run failed");
          }
        }
      }
      launched.lock().unwrap().remove(&scope_id);
    });
  }

  async fn shutdown(&self, scope: &Arc<Scope>) {
    self.launched.lock().unwrap().remove(&scope.id());
  }
}
