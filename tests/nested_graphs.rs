//! Graph nesting: boundary wiring, spec export, unknown references, and
//! the lifecycle phases seen by nodes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use flowgraph::{
  Graph, GraphError, GraphStore, Node, NodeRegistry, NodeSpec, PortDirection, Scope,
};

fn double_graph(registry: &NodeRegistry) -> Graph {
  registry
    .parse(
      &json!({
        "name": "Double",
        "nodes": [
          {"type": "DataInput", "name": "In", "out": 1},
          {"type": "Add", "in_a": 1, "in_b": 1, "out": 2},
          {"type": "DataOutput", "name": "Out", "in": 2},
        ],
      })
      .to_string(),
    )
    .unwrap()
}

#[tokio::test]
async fn data_flows_through_a_nested_graph() {
  let registry = NodeRegistry::with_builtins();
  let store = Arc::new(GraphStore::new());
  store.insert(Arc::new(double_graph(&registry)));

  let outer = registry
    .parse(
      &json!({
        "name": "outer",
        "nodes": [
          {"type": "Value", "value": 21, "out": 10},
          {"type": "Double", "In": 10, "Out": 11},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = Scope::new(store, Arc::new(outer)).unwrap();
  scope.initialize().await.unwrap();
  assert_eq!(scope.data_path(11).get_integer().await.unwrap(), 42);
  scope.shutdown().await;
}

#[tokio::test]
async fn nested_graphs_nest_further() {
  let registry = NodeRegistry::with_builtins();
  let store = Arc::new(GraphStore::new());
  store.insert(Arc::new(double_graph(&registry)));
  store.insert(Arc::new(
    registry
      .parse(
        &json!({
          "name": "Quadruple",
          "nodes": [
            {"type": "DataInput", "name": "In", "out": 1},
            {"type": "Double", "In": 1, "Out": 2},
            {"type": "Double", "In": 2, "Out": 3},
            {"type": "DataOutput", "name": "Out", "in": 3},
          ],
        })
        .to_string(),
      )
      .unwrap(),
  ));

  let outer = registry
    .parse(
      &json!({
        "name": "outer",
        "nodes": [
          {"type": "Value", "value": 3, "out": 10},
          {"type": "Quadruple", "In": 10, "Out": 11},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = Scope::new(store, Arc::new(outer)).unwrap();
  scope.initialize().await.unwrap();
  assert_eq!(scope.data_path(11).get_integer().await.unwrap(), 12);
  scope.shutdown().await;
}

#[tokio::test]
async fn control_round_trips_through_the_boundary() {
  let registry = NodeRegistry::with_builtins();
  let store = Arc::new(GraphStore::new());
  // Run goes in, Done comes back out, over one inner path.
  store.insert(Arc::new(
    registry
      .parse(
        &json!({
          "name": "Relay",
          "nodes": [
            {"type": "ControlInput", "name": "Run", "out": 1},
            {"type": "ControlOutput", "name": "Done", "in": 1},
          ],
        })
        .to_string(),
      )
      .unwrap(),
  ));

  let outer = registry
    .parse(
      &json!({
        "name": "outer",
        "nodes": [{"type": "Relay", "Run": 10, "Done": 11}],
      })
      .to_string(),
    )
    .unwrap();

  let scope = Scope::new(store, Arc::new(outer)).unwrap();
  scope.initialize().await.unwrap();

  let hits = Arc::new(Mutex::new(0));
  let counter = hits.clone();
  scope.control_path(11).declare(move || {
    let counter = counter.clone();
    async move {
      *counter.lock().unwrap() += 1;
      Ok(())
    }
  });

  scope.control_path(10).invoke().await.unwrap();
  scope.control_path(10).invoke().await.unwrap();
  assert_eq!(*hits.lock().unwrap(), 2);
  scope.shutdown().await;
}

#[tokio::test]
async fn graph_spec_exports_the_boundary() {
  let registry = NodeRegistry::with_builtins();
  let graph = registry
    .parse(
      &json!({
        "name": "Machine",
        "nodes": [
          {"type": "ControlInput", "name": "Run", "out": 1},
          {"type": "DataInput", "name": "Speed", "out": 2},
          {"type": "DataOutput", "name": "Position", "in": 3},
          {"type": "ControlOutput", "name": "Done", "in": 4},
          {"type": "Value", "value": 0, "out": 3},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let spec = graph.to_spec();
  assert_eq!(spec.type_name, "Machine");
  let directions: Vec<(&str, PortDirection)> = spec
    .ports
    .iter()
    .map(|port| (port.name.as_str(), port.direction))
    .collect();
  assert_eq!(
    directions,
    vec![
      ("Run", PortDirection::ControlIn),
      ("Speed", PortDirection::DataIn),
      ("Position", PortDirection::DataOut),
      ("Done", PortDirection::ControlOut),
    ]
  );
}

#[tokio::test]
async fn unknown_reference_is_inert_not_fatal() {
  let registry = NodeRegistry::with_builtins();
  let outer = registry
    .parse(
      &json!({
        "name": "outer",
        "nodes": [
          {"type": "Value", "value": 1, "out": 1},
          {"type": "NoSuchGraph", "In": 1, "Out": 2},
        ],
      })
      .to_string(),
    )
    .unwrap();

  let scope = Scope::new(Arc::new(GraphStore::new()), Arc::new(outer)).unwrap();
  scope.initialize().await.unwrap();
  // The missing graph's output never got a producer.
  assert!(scope.data_path(2).get().await.is_err());
  scope.shutdown().await;
}

/// Test node: records which lifecycle phase each call belongs to.
struct PhaseLog {
  label: &'static str,
  log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Node for PhaseLog {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new("PhaseLog", Vec::new())
  }

  async fn initialize(&self, _scope: &Arc<Scope>) -> Result<(), GraphError> {
    self.log.lock().unwrap().push(format!("init {}", self.label));
    Ok(())
  }

  async fn post_initialize(&self, _scope: &Arc<Scope>) -> Result<(), GraphError> {
    self.log.lock().unwrap().push(format!("post {}", self.label));
    Ok(())
  }

  async fn shutdown(&self, _scope: &Arc<Scope>) {
    self.log.lock().unwrap().push(format!("down {}", self.label));
  }
}

#[tokio::test]
async fn lifecycle_phases_run_in_order() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let nodes: Vec<Arc<dyn Node>> = vec![
    Arc::new(PhaseLog {
      label: "a",
      log: log.clone(),
    }),
    Arc::new(PhaseLog {
      label: "b",
      log: log.clone(),
    }),
  ];
  let scope = Scope::new(Arc::new(GraphStore::new()), Arc::new(Graph::new("phases", nodes))).unwrap();
  scope.initialize().await.unwrap();
  scope.shutdown().await;

  // Every initialize precedes every post-initialize; shutdown reverses.
  assert_eq!(
    *log.lock().unwrap(),
    vec!["init a", "init b", "post a", "post b", "down b", "down a"]
  );
}
