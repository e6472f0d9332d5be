//! End-to-end graph execution: wiring through shared path ids, loops,
//! dispatch, lazy evaluation policies, and the task lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio_test::assert_ok;

use flowgraph::nodes::entry::Entry;
use flowgraph::nodes::task::Wait;
use flowgraph::{
  Graph, GraphError, GraphStore, Node, NodeRegistry, NodeSpec, PathId, Scope, Value,
};

fn init_tracing() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Test node: when its control path fires, reads a data path and records
/// the value.
struct Recorder {
  in_control: PathId,
  in_value: PathId,
  seen: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Node for Recorder {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new("Recorder", Vec::new())
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_value]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let in_value = self.in_value;
    let seen = self.seen.clone();
    scope.control_path(self.in_control).declare(move || {
      let weak = weak.clone();
      let seen = seen.clone();
      async move {
        let Some(scope) = weak.upgrade() else {
          return Ok(());
        };
        let value = scope.data_path(in_value).get().await?;
        seen.lock().unwrap().push(value);
        Ok(())
      }
    });
    Ok(())
  }
}

/// Test node: a data producer whose thunk counts its evaluations.
struct CountingSource {
  out: PathId,
  calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for CountingSource {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new("CountingSource", Vec::new())
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let calls = self.calls.clone();
    scope.data_path(self.out).set_thunk(move || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Integer(7))
      }
    })?;
    Ok(())
  }
}

/// Test node: a control consumer that takes a while before counting the
/// hit, so tests can observe in-flight runs.
struct SlowHit {
  in_control: PathId,
  hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for SlowHit {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new("SlowHit", Vec::new())
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let hits = self.hits.clone();
    scope.control_path(self.in_control).declare(move || {
      let hits = hits.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }
    });
    Ok(())
  }
}

fn scope_for(graph: Graph) -> Arc<Scope> {
  Scope::new(Arc::new(GraphStore::new()), Arc::new(graph)).unwrap()
}

#[tokio::test]
async fn shared_path_ids_wire_producer_to_consumer() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "sum",
        "nodes": [
          {"type": "Value", "value": 5, "out": 1},
          {"type": "Add", "in_a": 1, "in_b": 1, "out": 2},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = scope_for(graph);
  assert_ok!(scope.initialize().await);
  assert_eq!(scope.data_path(2).get_integer().await.unwrap(), 10);
  scope.shutdown().await;
}

#[tokio::test]
async fn for_each_runs_body_per_element_and_exits_once() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "loop",
        "nodes": [
          {"type": "Entry", "out": 1},
          {"type": "Value", "value": [1, 2, 3], "out": 2},
          {"type": "ForEach", "in": 1, "in_value": 2, "out_body": 3, "out_value": 4, "out": 5},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let elements = Arc::new(Mutex::new(Vec::new()));
  let exits = Arc::new(Mutex::new(Vec::new()));
  let mut nodes = graph_nodes(graph);
  nodes.push(Arc::new(Recorder {
    in_control: 3,
    in_value: 4,
    seen: elements.clone(),
  }));
  nodes.push(Arc::new(Recorder {
    in_control: 5,
    in_value: 4,
    seen: exits.clone(),
  }));

  let scope = scope_for(Graph::new("loop", nodes));
  scope.initialize().await.unwrap();
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(
    *elements.lock().unwrap(),
    vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
  );
  // The exit fired exactly once, after the last iteration.
  assert_eq!(*exits.lock().unwrap(), vec![Value::Integer(3)]);
  scope.shutdown().await;
}

#[tokio::test]
async fn for_counts_an_end_exclusive_range() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "count",
        "nodes": [
          {"type": "Entry", "out": 1},
          {"type": "Value", "value": 2, "out": 2},
          {"type": "Value", "value": 5, "out": 3},
          {"type": "For", "in": 1, "in_range_start": 2, "in_range_end": 3,
           "out_body": 4, "out_value": 5, "out": 6},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let indices = Arc::new(Mutex::new(Vec::new()));
  let mut nodes = graph_nodes(graph);
  nodes.push(Arc::new(Recorder {
    in_control: 4,
    in_value: 5,
    seen: indices.clone(),
  }));

  let scope = scope_for(Graph::new("count", nodes));
  scope.initialize().await.unwrap();
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(
    *indices.lock().unwrap(),
    vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]
  );
  scope.shutdown().await;
}

#[tokio::test]
async fn branch_dispatches_by_value_with_default_fallback() {
  let registry = NodeRegistry::with_builtins();
  let hits = Arc::new(Mutex::new(Vec::new()));
  for (selector, expected) in [
    (json!(1), Value::String("one".into())),
    (json!(2), Value::String("two".into())),
    (json!(9), Value::String("other".into())),
  ] {
    let graph = registry
      .parse(
        &json!({
          "name": "dispatch",
          "nodes": [
            {"type": "Entry", "out": 1},
            {"type": "Value", "value": selector, "out": 2},
            {"type": "Branch", "in": 1, "in_value": 2, "out": {"1": 3, "2": 4}, "out_default": 5},
            {"type": "Value", "value": "one", "out": 6},
            {"type": "Value", "value": "two", "out": 7},
            {"type": "Value", "value": "other", "out": 8},
          ],
        })
        .to_string(),
      )
      .unwrap();

    let mut nodes = graph_nodes(graph);
    for (control, value) in [(3, 6), (4, 7), (5, 8)] {
      nodes.push(Arc::new(Recorder {
        in_control: control,
        in_value: value,
        seen: hits.clone(),
      }));
    }
    let scope = scope_for(Graph::new("dispatch", nodes));
    scope.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scope.shutdown().await;

    assert_eq!(std::mem::take(&mut *hits.lock().unwrap()), vec![expected]);
  }
}

#[tokio::test]
async fn select_reads_the_matching_case() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "select",
        "nodes": [
          {"type": "Value", "value": "b", "out": 1},
          {"type": "Value", "value": 10, "out": 2},
          {"type": "Value", "value": 20, "out": 3},
          {"type": "Value", "value": -1, "out": 4},
          {"type": "Select", "in_value": 1, "in": {"\"a\"": 2, "\"b\"": 3}, "in_default": 4, "out": 5},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = scope_for(graph);
  scope.initialize().await.unwrap();
  assert_eq!(scope.data_path(5).get_integer().await.unwrap(), 20);
  scope.shutdown().await;
}

#[tokio::test]
async fn map_entries_read_and_extend() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "maps",
        "nodes": [
          {"type": "Value", "value": {"a": 1}, "out": 1},
          {"type": "Value", "value": "b", "out": 2},
          {"type": "Value", "value": 2, "out": 3},
          {"type": "MapSet", "in_map": 1, "in_key": 2, "in_value": 3, "out": 4},
          {"type": "MapGet", "in_map": 4, "in_key": 2, "out": 5},
          {"type": "Value", "value": "missing", "out": 6},
          {"type": "MapGet", "in_map": 1, "in_key": 6, "out": 7},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = scope_for(graph);
  scope.initialize().await.unwrap();
  assert_eq!(scope.data_path(5).get_integer().await.unwrap(), 2);
  // The source map is untouched by the extension.
  assert_eq!(scope.data_path(1).get_map().await.unwrap().len(), 1);
  assert_eq!(scope.data_path(7).get().await.unwrap(), Value::Null);
  scope.shutdown().await;
}

#[tokio::test]
async fn duplicate_producer_fails_initialization() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "clash",
        "nodes": [
          {"type": "Value", "value": 1, "out": 1},
          {"type": "Value", "value": 2, "out": 1},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = scope_for(graph);
  let error = scope.initialize().await.unwrap_err();
  assert!(error.to_string().contains("already has a producer"));
  scope.shutdown().await;
}

#[tokio::test]
async fn unread_paths_stay_undefined() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(&json!({"name": "empty", "nodes": []}).to_string())
    .unwrap();
  let scope = scope_for(graph);
  scope.initialize().await.unwrap();
  assert!(scope.data_path(99).get().await.is_err());
  scope.shutdown().await;
}

#[tokio::test]
async fn diamond_reads_reevaluate_unless_cached() {
  let registry = NodeRegistry::with_builtins();

  // Both Add operands pull the source directly: two evaluations.
  let calls = Arc::new(AtomicUsize::new(0));
  let mut nodes: Vec<Arc<dyn Node>> = vec![Arc::new(CountingSource {
    out: 1,
    calls: calls.clone(),
  })];
  nodes.extend(graph_nodes(
    registry
      .parse(
        &json!({"name": "d", "nodes": [{"type": "Add", "in_a": 1, "in_b": 1, "out": 2}]}).to_string(),
      )
      .unwrap(),
  ));
  let scope = scope_for(Graph::new("diamond", nodes));
  scope.initialize().await.unwrap();
  assert_eq!(scope.data_path(2).get_integer().await.unwrap(), 14);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  scope.shutdown().await;

  // Through a cache: one evaluation, shared by both arms.
  let calls = Arc::new(AtomicUsize::new(0));
  let mut nodes: Vec<Arc<dyn Node>> = vec![Arc::new(CountingSource {
    out: 1,
    calls: calls.clone(),
  })];
  nodes.extend(graph_nodes(
    registry
      .parse(
        &json!({"name": "d", "nodes": [
          {"type": "Cache", "in_value": 1, "out": 2},
          {"type": "Add", "in_a": 2, "in_b": 2, "out": 3},
        ]})
        .to_string(),
      )
      .unwrap(),
  ));
  let scope = scope_for(Graph::new("diamond", nodes));
  scope.initialize().await.unwrap();
  assert_eq!(scope.data_path(3).get_integer().await.unwrap(), 14);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  scope.shutdown().await;
}

#[tokio::test]
async fn scope_chains_share_one_executor_thread() {
  init_tracing();
  let scope = scope_for(Graph::new("threads", Vec::new()));
  scope.initialize().await.unwrap();

  let threads = Arc::new(Mutex::new(Vec::new()));
  for id in [1, 2] {
    let threads = threads.clone();
    scope.control_path(id).declare(move || {
      let threads = threads.clone();
      async move {
        threads.lock().unwrap().push(std::thread::current().id());
        // Suspend mid-chain so a second executor, if one existed, could
        // pick the continuation up.
        tokio::task::yield_now().await;
        threads.lock().unwrap().push(std::thread::current().id());
        Ok(())
      }
    });
  }

  let first = tokio::spawn({
    let scope = scope.clone();
    async move { scope.invoke(1).await }
  });
  let second = tokio::spawn({
    let scope = scope.clone();
    async move { scope.invoke(2).await }
  });
  assert_ok!(first.await.unwrap());
  assert_ok!(second.await.unwrap());

  let threads = threads.lock().unwrap().clone();
  assert_eq!(threads.len(), 4);
  assert!(threads.iter().all(|&thread| thread == threads[0]));
  assert_ne!(threads[0], std::thread::current().id());
  scope.shutdown().await;
}

#[tokio::test]
async fn entry_relaunches_after_a_completed_run() {
  let entry = Arc::new(Entry::new(1));
  let hits = Arc::new(AtomicUsize::new(0));
  let nodes: Vec<Arc<dyn Node>> = vec![
    entry.clone(),
    Arc::new(SlowHit {
      in_control: 1,
      hits: hits.clone(),
    }),
  ];
  let scope = scope_for(Graph::new("entry", nodes));
  scope.initialize().await.unwrap();

  tokio::time::sleep(Duration::from_millis(30)).await;
  assert!(entry.is_launched(scope.id()));
  // Launching while the first run is still in flight starts nothing.
  entry.launch(&scope).await;
  tokio::time::sleep(Duration::from_millis(150)).await;
  assert_eq!(hits.load(Ordering::SeqCst), 1);
  assert!(!entry.is_launched(scope.id()));

  // The completed run released its marker, so launching fires again.
  entry.launch(&scope).await;
  tokio::time::sleep(Duration::from_millis(150)).await;
  assert_eq!(hits.load(Ordering::SeqCst), 2);
  assert!(!entry.is_launched(scope.id()));
  scope.shutdown().await;
}

#[tokio::test]
async fn begin_suspends_until_the_wait_completes() {
  let wait = Arc::new(Wait::new(1, 2, 3, None, 4));
  let fired = Arc::new(Mutex::new(Vec::new()));
  let nodes: Vec<Arc<dyn Node>> = vec![
    wait.clone(),
    Arc::new(ValueOnPath(3)),
    Arc::new(Recorder {
      in_control: 4,
      in_value: 3,
      seen: fired.clone(),
    }),
  ];
  let scope = scope_for(Graph::new("wait", nodes));
  scope.initialize().await.unwrap();
  scope.data_path(3).set_value(Value::Float(0.05)).ok();

  let started = Instant::now();
  assert_ok!(scope.invoke(1).await);
  // The trigger only returns once the wait has elapsed and fired.
  assert!(started.elapsed() >= Duration::from_millis(50));
  assert!(!wait.is_running(scope.id()));
  assert_eq!(fired.lock().unwrap().len(), 1);
  scope.shutdown().await;
}

#[tokio::test]
async fn begin_while_running_is_a_noop() {
  init_tracing();
  let wait = Arc::new(Wait::new(1, 2, 3, None, 4));
  let fired = Arc::new(Mutex::new(Vec::new()));
  let nodes: Vec<Arc<dyn Node>> = vec![
    wait.clone(),
    Arc::new(ValueOnPath(3)),
    Arc::new(Recorder {
      in_control: 4,
      in_value: 3,
      seen: fired.clone(),
    }),
  ];
  let scope = scope_for(Graph::new("wait", nodes));
  scope.initialize().await.unwrap();
  scope.data_path(3).set_value(Value::Float(0.15)).ok();

  let first = tokio::spawn({
    let scope = scope.clone();
    async move { scope.invoke(1).await }
  });
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(wait.is_running(scope.id()));

  // A second Begin neither restarts the wait nor blocks for it.
  let started = Instant::now();
  assert_ok!(scope.invoke(1).await);
  assert!(started.elapsed() < Duration::from_millis(100));
  assert!(wait.is_running(scope.id()));

  assert_ok!(first.await.unwrap());
  assert_eq!(fired.lock().unwrap().len(), 1);

  // A restarted wait would fire a second time around now.
  tokio::time::sleep(Duration::from_millis(250)).await;
  assert_eq!(fired.lock().unwrap().len(), 1);
  scope.shutdown().await;
}

#[tokio::test]
async fn running_wait_drives_its_subgraph_until_completion() {
  let wait = Arc::new(Wait::new(1, 2, 3, Some(5), 4));
  let fired = Arc::new(Mutex::new(Vec::new()));
  let nodes: Vec<Arc<dyn Node>> = vec![
    wait.clone(),
    Arc::new(ValueOnPath(3)),
    Arc::new(Recorder {
      in_control: 4,
      in_value: 3,
      seen: fired.clone(),
    }),
  ];
  let scope = scope_for(Graph::new("wait", nodes));
  scope.initialize().await.unwrap();
  scope.data_path(3).set_value(Value::Float(0.05)).ok();

  let enters = Arc::new(AtomicUsize::new(0));
  let exits = Arc::new(AtomicUsize::new(0));
  let (enter_counter, exit_counter) = (enters.clone(), exits.clone());
  scope.control_path(5).declare(move || {
    let enters = enter_counter.clone();
    let exits = exit_counter.clone();
    async move {
      enters.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_secs(10)).await;
      exits.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  });

  assert_ok!(scope.invoke(1).await);
  // The subgraph chain started alongside the wait and was reclaimed when
  // the wait completed, well before its own sleep ended.
  assert_eq!(enters.load(Ordering::SeqCst), 1);
  assert_eq!(exits.load(Ordering::SeqCst), 0);
  assert_eq!(fired.lock().unwrap().len(), 1);
  assert!(!wait.is_running(scope.id()));
  scope.shutdown().await;
}

#[tokio::test]
async fn abort_joins_the_running_wait_and_is_idempotent() {
  let wait = Arc::new(Wait::new(1, 2, 3, None, 4));
  let fired = Arc::new(Mutex::new(Vec::new()));
  let nodes: Vec<Arc<dyn Node>> = vec![
    wait.clone(),
    Arc::new(ValueOnPath(3)),
    Arc::new(Recorder {
      in_control: 4,
      in_value: 3,
      seen: fired.clone(),
    }),
  ];
  let scope = scope_for(Graph::new("wait", nodes));
  scope.initialize().await.unwrap();
  scope.data_path(3).set_value(Value::Float(5.0)).ok();

  // Abort while idle is a no-op.
  assert_ok!(scope.invoke(2).await);
  assert!(!wait.is_running(scope.id()));

  let begin = tokio::spawn({
    let scope = scope.clone();
    async move { scope.invoke(1).await }
  });
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(wait.is_running(scope.id()));

  assert_ok!(scope.invoke(2).await);
  assert!(!wait.is_running(scope.id()));
  assert_ok!(begin.await.unwrap());
  assert!(fired.lock().unwrap().is_empty());
  scope.shutdown().await;
}

#[tokio::test]
async fn shutdown_releases_running_task_state() {
  let wait = Arc::new(Wait::new(1, 2, 3, None, 4));
  let nodes: Vec<Arc<dyn Node>> = vec![wait.clone(), Arc::new(ValueOnPath(3))];
  let scope = scope_for(Graph::new("wait", nodes));
  scope.initialize().await.unwrap();
  scope.data_path(3).set_value(Value::Float(60.0)).ok();

  let begin = tokio::spawn({
    let scope = scope.clone();
    async move { scope.invoke(1).await }
  });
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(wait.is_running(scope.id()));
  scope.shutdown().await;
  assert!(!wait.is_running(scope.id()));
  assert_ok!(begin.await.unwrap());
}

/// Test node: marks a data path as required so ordering places consumers
/// after it, without binding anything. Tests bind the path themselves.
struct ValueOnPath(PathId);

#[async_trait]
impl Node for ValueOnPath {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new("ValueOnPath", Vec::new())
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.0]
  }

  async fn initialize(&self, _scope: &Arc<Scope>) -> Result<(), GraphError> {
    Ok(())
  }
}

fn graph_nodes(graph: Graph) -> Vec<Arc<dyn Node>> {
  graph.nodes().to_vec()
}
