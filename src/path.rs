//! # Control and Data Paths
//!
//! Paths are the wires of a flow graph. A node's ports are bound to integer
//! path ids at graph-assembly time; at initialization time each node looks
//! its paths up in the owning [`Scope`](crate::scope::Scope) and attaches
//! behavior to them.
//!
//! Two kinds exist:
//!
//! - [`ControlPath`] is a broadcast trigger. Consumers declare zero-argument
//!   suspending callbacks; invoking the path runs every callback in
//!   declaration order, waiting for each to finish before starting the
//!   next. A path with no callbacks is a silent no-op.
//! - [`DataPath`] is a single-producer, pull-evaluated value cell. Exactly
//!   one producer binds either a constant or a thunk; readers call
//!   [`DataPath::get`], which resolves the thunk on every read unless the
//!   producer opted into memoization. Binding twice fails with
//!   [`PathError::AlreadySet`]; reading an unbound path fails with
//!   [`PathError::Undefined`].
//!
//! Loop drivers own their iteration output and publish a fresh constant per
//! iteration through [`DataPath::store`]; that is the bound producer
//! mutating its own cell, not a second producer, so the single-shot rule is
//! unaffected.

use std::future::Future;
use std::sync::Mutex;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::error::PathError;
use crate::value::Value;

/// Integer identifier of a path, unique within one scope.
pub type PathId = u32;

type ControlCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<(), PathError>> + Send + Sync>;
type DataThunk = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, PathError>> + Send + Sync>;

/// A broadcast trigger wire.
///
/// Invocation fans out to all declared callbacks sequentially: callback N+1
/// does not start until callback N has completed, even if N suspends. An
/// error from one callback aborts the remaining siblings of that
/// invocation and propagates to the invoker.
pub struct ControlPath {
  id: PathId,
  callbacks: Mutex<Vec<ControlCallback>>,
}

impl ControlPath {
  pub(crate) fn new(id: PathId) -> Self {
    Self {
      id,
      callbacks: Mutex::new(Vec::new()),
    }
  }

  /// Returns the id of this path.
  pub fn id(&self) -> PathId {
    self.id
  }

  /// Declares a callback on this path.
  ///
  /// The callback is appended to the invocation order; declaration order is
  /// node initialization order, which in turn is the graph's topological
  /// order.
  pub fn declare<F, Fut>(&self, callback: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PathError>> + Send + 'static,
  {
    let callback: ControlCallback = Arc::new(move || Box::pin(callback()));
    self.callbacks.lock().unwrap().push(callback);
  }

  /// Returns whether any callback has been declared.
  pub fn is_declared(&self) -> bool {
    !self.callbacks.lock().unwrap().is_empty()
  }

  /// Returns the number of declared callbacks.
  pub fn callback_count(&self) -> usize {
    self.callbacks.lock().unwrap().len()
  }

  /// Fires a control token through this path.
  ///
  /// Runs every declared callback in declaration order and returns once all
  /// have completed. Invoking a path with no callbacks is a no-op.
  pub async fn invoke(&self) -> Result<(), PathError> {
    let callbacks: Vec<ControlCallback> = self.callbacks.lock().unwrap().clone();
    for callback in callbacks {
      callback().await?;
    }
    Ok(())
  }
}

#[derive(Default)]
struct ProducerCell {
  constant: Option<Value>,
  thunk: Option<DataThunk>,
  memoized: bool,
}

/// A single-producer, pull-evaluated value cell.
pub struct DataPath {
  id: PathId,
  cell: Mutex<ProducerCell>,
  memo: OnceCell<Value>,
}

impl DataPath {
  pub(crate) fn new(id: PathId) -> Self {
    Self {
      id,
      cell: Mutex::new(ProducerCell::default()),
      memo: OnceCell::new(),
    }
  }

  /// Returns the id of this path.
  pub fn id(&self) -> PathId {
    self.id
  }

  /// Binds a constant value as this path's producer.
  ///
  /// # Errors
  ///
  /// Fails with [`PathError::AlreadySet`] if any producer is already bound.
  pub fn set_value(&self, value: Value) -> Result<(), PathError> {
    let mut cell = self.cell.lock().unwrap();
    if cell.constant.is_some() || cell.thunk.is_some() {
      return Err(PathError::AlreadySet(self.id));
    }
    cell.constant = Some(value);
    Ok(())
  }

  /// Binds a lazily evaluated thunk as this path's producer. The thunk is
  /// re-evaluated on every read.
  ///
  /// # Errors
  ///
  /// Fails with [`PathError::AlreadySet`] if any producer is already bound.
  pub fn set_thunk<F, Fut>(&self, thunk: F) -> Result<(), PathError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, PathError>> + Send + 'static,
  {
    self.bind_thunk(thunk, false)
  }

  /// Binds a thunk that is evaluated at most once per scope lifetime;
  /// later reads observe the cached result. Concurrent first reads are
  /// serialized so the thunk still runs exactly once.
  ///
  /// # Errors
  ///
  /// Fails with [`PathError::AlreadySet`] if any producer is already bound.
  pub fn set_thunk_memoized<F, Fut>(&self, thunk: F) -> Result<(), PathError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, PathError>> + Send + 'static,
  {
    self.bind_thunk(thunk, true)
  }

  fn bind_thunk<F, Fut>(&self, thunk: F, memoized: bool) -> Result<(), PathError>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, PathError>> + Send + 'static,
  {
    let mut cell = self.cell.lock().unwrap();
    if cell.constant.is_some() || cell.thunk.is_some() {
      return Err(PathError::AlreadySet(self.id));
    }
    cell.thunk = Some(Arc::new(move || Box::pin(thunk())));
    cell.memoized = memoized;
    Ok(())
  }

  /// Publishes a constant from the path's own producer, overwriting the
  /// previous constant. Loop drivers use this for per-iteration outputs
  /// and task nodes for per-event outputs.
  ///
  /// # Errors
  ///
  /// Fails with [`PathError::AlreadySet`] if a thunk producer is bound;
  /// a thunk-producing node cannot also publish constants.
  pub fn store(&self, value: Value) -> Result<(), PathError> {
    let mut cell = self.cell.lock().unwrap();
    if cell.thunk.is_some() {
      return Err(PathError::AlreadySet(self.id));
    }
    cell.constant = Some(value);
    Ok(())
  }

  /// Returns the bound constant, if the producer is a constant.
  pub fn constant(&self) -> Option<Value> {
    self.cell.lock().unwrap().constant.clone()
  }

  /// Returns whether any producer is bound.
  pub fn is_set(&self) -> bool {
    let cell = self.cell.lock().unwrap();
    cell.constant.is_some() || cell.thunk.is_some()
  }

  /// Reads the current value of this path.
  ///
  /// Constants are cloned; thunks are resolved on every read unless bound
  /// with [`DataPath::set_thunk_memoized`].
  ///
  /// # Errors
  ///
  /// Fails with [`PathError::Undefined`] if no producer is bound, or with
  /// whatever error the producing thunk raises.
  pub async fn get(&self) -> Result<Value, PathError> {
    let (constant, thunk, memoized) = {
      let cell = self.cell.lock().unwrap();
      (cell.constant.clone(), cell.thunk.clone(), cell.memoized)
    };
    if let Some(value) = constant {
      return Ok(value);
    }
    match thunk {
      Some(thunk) if memoized => self.memo.get_or_try_init(|| thunk()).await.cloned(),
      Some(thunk) => thunk().await,
      None => Err(PathError::Undefined(self.id)),
    }
  }

  /// Reads and converts to a boolean.
  pub async fn get_bool(&self) -> Result<bool, PathError> {
    Ok(self.get().await?.as_bool())
  }

  /// Reads and converts to an integer.
  pub async fn get_integer(&self) -> Result<i64, PathError> {
    self.get().await?.as_integer()
  }

  /// Reads and converts to a float.
  pub async fn get_float(&self) -> Result<f64, PathError> {
    self.get().await?.as_float()
  }

  /// Reads and converts to a string.
  pub async fn get_string(&self) -> Result<String, PathError> {
    Ok(self.get().await?.as_string())
  }

  /// Reads and converts to a list.
  pub async fn get_list(&self) -> Result<Vec<Value>, PathError> {
    Ok(self.get().await?.as_list())
  }

  /// Reads and converts to a map.
  pub async fn get_map(&self) -> Result<std::collections::BTreeMap<String, Value>, PathError> {
    self.get().await?.as_map()
  }
}
