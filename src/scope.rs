//! # Execution Scopes
//!
//! A scope is one live instance of a graph: the concrete path objects, the
//! spawned tasks, and the cancellation domain. The same graph can run in
//! any number of scopes at once; nodes keep per-scope state keyed by
//! [`ScopeId`] rather than storing it in themselves.
//!
//! Paths come into existence on first touch. Two nodes bound to the same
//! path id observe the same path object, which is the entire wiring
//! mechanism; there is no separate connection step.
//!
//! Each scope owns a single-threaded executor: a current-thread tokio
//! runtime parked on a dedicated thread. Every task the scope spawns and
//! every externally invoked control chain runs there, so logical tasks of
//! one scope interleave only at suspension points and never run in
//! parallel with each other.
//!
//! Lifecycle: [`Scope::initialize`] walks the graph's initialization order
//! calling `initialize` on each node, then runs the `post_initialize` pass
//! over all nodes, then launches entry nodes. [`Scope::shutdown`] cancels
//! the scope's token, walks nodes in reverse order calling `shutdown`,
//! joins every task the scope spawned, then stops the executor thread.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{GraphError, PathError};
use crate::graph::{Graph, GraphManager};
use crate::path::{ControlPath, DataPath, PathId};

/// Unique identifier of a scope within the process.
pub type ScopeId = u64;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Single-threaded execution context of one scope: a current-thread tokio
/// runtime driven by a dedicated thread until told to stop.
struct ScopeExecutor {
  handle: runtime::Handle,
  stop: Mutex<Option<oneshot::Sender<()>>>,
  thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ScopeExecutor {
  fn new(scope_id: ScopeId) -> Result<Self, GraphError> {
    let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
    let handle = runtime.handle().clone();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let thread = std::thread::Builder::new()
      .name(format!("scope-{scope_id}"))
      .spawn(move || {
        let _ = runtime.block_on(stop_rx);
      })?;
    Ok(Self {
      handle,
      stop: Mutex::new(Some(stop_tx)),
      thread: Mutex::new(Some(thread)),
    })
  }

  fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
  where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
  {
    self.handle.spawn(future)
  }

  fn signal_stop(&self) {
    if let Some(stop) = self.stop.lock().unwrap().take() {
      let _ = stop.send(());
    }
  }

  /// Stops the runtime and waits for its thread to exit. Blocking join is
  /// pushed onto the blocking pool so a caller inside another runtime
  /// does not stall it.
  async fn stop(&self) {
    self.signal_stop();
    let thread = self.thread.lock().unwrap().take();
    if let Some(thread) = thread {
      let _ = tokio::task::spawn_blocking(move || {
        let _ = thread.join();
      })
      .await;
    }
  }
}

impl Drop for ScopeExecutor {
  fn drop(&mut self) {
    self.signal_stop();
  }
}

/// One live instance of a graph.
pub struct Scope {
  id: ScopeId,
  graph: Arc<Graph>,
  manager: Arc<dyn GraphManager>,
  control_paths: Mutex<HashMap<PathId, Arc<ControlPath>>>,
  data_paths: Mutex<HashMap<PathId, Arc<DataPath>>>,
  cancellation: CancellationToken,
  executor: ScopeExecutor,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scope {
  /// Creates a root scope for `graph`.
  ///
  /// # Errors
  ///
  /// Fails when the scope's executor thread cannot be started.
  pub fn new(manager: Arc<dyn GraphManager>, graph: Arc<Graph>) -> Result<Arc<Self>, GraphError> {
    Self::with_token(manager, graph, CancellationToken::new())
  }

  /// Creates a nested scope sharing this scope's graph manager. The child
  /// holds a child token, so cancelling the parent cancels it too.
  pub fn sub_scope(&self, graph: Arc<Graph>) -> Result<Arc<Self>, GraphError> {
    Self::with_token(self.manager.clone(), graph, self.cancellation.child_token())
  }

  fn with_token(
    manager: Arc<dyn GraphManager>,
    graph: Arc<Graph>,
    cancellation: CancellationToken,
  ) -> Result<Arc<Self>, GraphError> {
    let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
    Ok(Arc::new(Self {
      id,
      graph,
      manager,
      control_paths: Mutex::new(HashMap::new()),
      data_paths: Mutex::new(HashMap::new()),
      cancellation,
      executor: ScopeExecutor::new(id)?,
      tasks: Mutex::new(Vec::new()),
    }))
  }

  /// Returns the unique id of this scope.
  pub fn id(&self) -> ScopeId {
    self.id
  }

  /// Returns the graph this scope instantiates.
  pub fn graph(&self) -> &Arc<Graph> {
    &self.graph
  }

  /// Returns the graph manager shared across the scope tree.
  pub fn manager(&self) -> &Arc<dyn GraphManager> {
    &self.manager
  }

  /// Returns the cancellation token of this scope.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancellation
  }

  /// Returns the control path with the given id, creating it on first
  /// touch. All nodes of the scope touching the same id share one path.
  pub fn control_path(&self, id: PathId) -> Arc<ControlPath> {
    self
      .control_paths
      .lock()
      .unwrap()
      .entry(id)
      .or_insert_with(|| Arc::new(ControlPath::new(id)))
      .clone()
  }

  /// Returns the data path with the given id, creating it on first touch.
  pub fn data_path(&self, id: PathId) -> Arc<DataPath> {
    self
      .data_paths
      .lock()
      .unwrap()
      .entry(id)
      .or_insert_with(|| Arc::new(DataPath::new(id)))
      .clone()
  }

  /// Spawns a task owned by this scope onto the scope's executor. Owned
  /// tasks are joined on shutdown; they should observe
  /// [`Scope::cancellation`] to finish promptly once the scope tears
  /// down. Spawning after cancellation is a no-op.
  pub fn spawn<F>(&self, future: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    if self.cancellation.is_cancelled() {
      return;
    }
    self.tasks.lock().unwrap().push(self.executor.spawn(future));
  }

  /// Invokes a control path on the scope's executor, suspending until the
  /// whole chain completes. External triggers enter here so they
  /// serialize with everything else the scope runs.
  pub async fn invoke(self: &Arc<Self>, id: PathId) -> Result<(), PathError> {
    let path = self.control_path(id);
    match self.executor.spawn(async move { path.invoke().await }).await {
      Ok(result) => result,
      Err(error) => {
        warn!(scope = self.id, path = id, %error, "invocation did not complete");
        Ok(())
      }
    }
  }

  /// Brings this scope to life: initializes every node in topological
  /// order, runs the post-initialization pass, then launches entries.
  ///
  /// # Errors
  ///
  /// The first node initialization error aborts the walk and is returned;
  /// a scope that failed to initialize should be shut down.
  pub async fn initialize(self: &Arc<Self>) -> Result<(), GraphError> {
    debug!(scope = self.id, graph = self.graph.name(), "initializing scope");
    for node in self.graph.initialization_order() {
      node.initialize(self).await?;
    }
    for node in self.graph.initialization_order() {
      node.post_initialize(self).await?;
    }
    for node in self.graph.initialization_order() {
      node.launch(self).await;
    }
    Ok(())
  }

  /// Tears this scope down: cancels the scope token, shuts nodes down in
  /// reverse initialization order, joins every owned task, then stops the
  /// scope's executor.
  pub async fn shutdown(self: &Arc<Self>) {
    debug!(scope = self.id, graph = self.graph.name(), "shutting down scope");
    self.cancellation.cancel();
    for node in self.graph.initialization_order().rev() {
      node.shutdown(self).await;
    }
    let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
    for task in tasks {
      let _ = task.await;
    }
    self.executor.stop().await;
  }
}
