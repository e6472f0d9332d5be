//! # Task Nodes
//!
//! A task is a long-running activity with a Begin/Abort control surface.
//! Begin runs the operation on the invoking control chain: the chain
//! suspends until the operation completes naturally or is aborted, so
//! downstream callbacks of the same trigger wait their turn. Begin while
//! already running is a no-op; Abort cancels the run and waits for it to
//! actually stop; Abort while idle is a no-op.
//!
//! While the operation runs, an optional subgraph control output is
//! driven as its own scope-owned job, cancelled and joined when the run
//! ends either way.
//!
//! The per-scope bookkeeping lives in [`TaskLifecycle`], which task node
//! types embed. State is keyed by scope id and released when the run
//! ends, on abort, and on scope shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{GraphError, PathError};
use crate::node::{Node, NodeDescription};
use crate::path::PathId;
use crate::scope::{Scope, ScopeId};
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::ValueKind;

struct RunningTask {
  cancel: CancellationToken,
  done: watch::Receiver<bool>,
}

/// Releases the run record and signals joiners, even when the run future
/// is dropped mid-flight by scope teardown.
struct RunGuard {
  running: Arc<Mutex<HashMap<ScopeId, RunningTask>>>,
  scope_id: ScopeId,
  done: watch::Sender<bool>,
}

impl Drop for RunGuard {
  fn drop(&mut self) {
    self.running.lock().unwrap().remove(&self.scope_id);
    let _ = self.done.send(true);
  }
}

/// Per-scope running-task bookkeeping shared between a task node and its
/// runs.
#[derive(Clone, Default)]
pub struct TaskLifecycle {
  running: Arc<Mutex<HashMap<ScopeId, RunningTask>>>,
}

impl TaskLifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether a run is in flight for the given scope.
  pub fn is_running(&self, scope_id: ScopeId) -> bool {
    self.running.lock().unwrap().contains_key(&scope_id)
  }

  /// Runs `work` to completion on the calling control chain, racing it
  /// against abort and scope cancellation. A run already in flight for
  /// this scope makes this a no-op.
  ///
  /// When `subgraph` is given, that control path is driven as a
  /// scope-owned job for the duration of the run and cancelled-and-joined
  /// once the run ends, completed or not.
  pub async fn begin<Fut>(
    &self,
    scope: &Arc<Scope>,
    subgraph: Option<PathId>,
    work: Fut,
  ) -> Result<(), PathError>
  where
    Fut: Future<Output = Result<(), PathError>> + Send,
  {
    let cancel = scope.cancellation().child_token();
    let (done_tx, done_rx) = watch::channel(false);
    {
      let mut running = self.running.lock().unwrap();
      if running.contains_key(&scope.id()) {
        return Ok(());
      }
      running.insert(
        scope.id(),
        RunningTask {
          cancel: cancel.clone(),
          done: done_rx,
        },
      );
    }
    let _guard = RunGuard {
      running: self.running.clone(),
      scope_id: scope.id(),
      done: done_tx,
    };

    let side = subgraph.map(|id| {
      let token = cancel.child_token();
      let job_token = token.clone();
      let weak = Arc::downgrade(scope);
      let (side_tx, side_rx) = watch::channel(false);
      scope.spawn(async move {
        let run = async {
          if let Some(scope) = weak.upgrade() {
            if let Err(error) = scope.control_path(id).invoke().await {
              warn!(%error, "task subgraph run failed");
            }
          }
        };
        tokio::select! {
          _ = job_token.cancelled() => {}
          _ = run => {}
        }
        let _ = side_tx.send(true);
      });
      (token, side_rx)
    });

    let result = tokio::select! {
      _ = cancel.cancelled() => Ok(()),
      result = work => result,
    };

    if let Some((token, mut side_done)) = side {
      token.cancel();
      let _ = side_done.wait_for(|finished| *finished).await;
    }
    result
  }

  /// Cancels the run for the given scope, if any, and waits for it to
  /// stop. Idle scopes are a no-op.
  pub async fn abort(&self, scope_id: ScopeId) {
    let task = self.running.lock().unwrap().remove(&scope_id);
    if let Some(task) = task {
      task.cancel.cancel();
      let mut done = task.done;
      let _ = done.wait_for(|finished| *finished).await;
    }
  }
}

/// Waits for a duration, then fires its outgoing control path.
pub struct Wait {
  in_begin: PathId,
  in_abort: PathId,
  in_duration: PathId,
  out_subgraph: Option<PathId>,
  out: PathId,
  lifecycle: TaskLifecycle,
}

impl Wait {
  pub const TYPE: &'static str = "Wait";

  pub fn new(
    in_begin: PathId,
    in_abort: PathId,
    in_duration: PathId,
    out_subgraph: Option<PathId>,
    out: PathId,
  ) -> Self {
    Self {
      in_begin,
      in_abort,
      in_duration,
      out_subgraph,
      out,
      lifecycle: TaskLifecycle::new(),
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in_begin")?,
      description.path_id("in_abort")?,
      description.path_id("in_duration")?,
      description.opt_path_id("out_subgraph")?,
      description.path_id("out")?,
    ))
  }

  /// Whether a wait is pending in the given scope.
  pub fn is_running(&self, scope_id: ScopeId) -> bool {
    self.lifecycle.is_running(scope_id)
  }
}

#[async_trait]
impl Node for Wait {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("Begin", "in_begin", PortDirection::ControlIn),
        PortSpec::new("Abort", "in_abort", PortDirection::ControlIn),
        PortSpec::new("Duration", "in_duration", PortDirection::DataIn).of_kind(ValueKind::Float),
        PortSpec::new("Subgraph", "out_subgraph", PortDirection::ControlOut),
        PortSpec::new("Out", "out", PortDirection::ControlOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_duration]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let lifecycle = self.lifecycle.clone();
    let in_duration = self.in_duration;
    let out_subgraph = self.out_subgraph;
    let out = self.out;
    scope.control_path(self.in_begin).declare(move || {
      let weak = weak.clone();
      let lifecycle = lifecycle.clone();
      async move {
        let Some(scope) = weak.upgrade() else {
          return Ok(());
        };
        let seconds = scope.data_path(in_duration).get_float().await?;
        let run_scope = Arc::downgrade(&scope);
        lifecycle
          .begin(&scope, out_subgraph, async move {
            tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            match run_scope.upgrade() {
              Some(scope) => scope.control_path(out).invoke().await,
              None => Ok(()),
            }
          })
          .await
      }
    });

    let lifecycle = self.lifecycle.clone();
    let scope_id = scope.id();
    scope.control_path(self.in_abort).declare(move || {
      let lifecycle = lifecycle.clone();
      async move {
        lifecycle.abort(scope_id).await;
        Ok(())
      }
    });
    Ok(())
  }

  async fn shutdown(&self, scope: &Arc<Scope>) {
    self.lifecycle.abort(scope.id()).await;
  }
}
