//! # flowgraph
//!
//! A flow-based graph execution engine: graphs of typed nodes wired
//! through integer path ids, with separate control paths (push triggers)
//! and data paths (pull values), cooperative async execution on tokio,
//! and nesting of graphs as nodes of other graphs.
//!
//! A graph is assembled from a declarative json document (or built
//! programmatically), then instantiated as a [`Scope`]: per-instance path
//! objects, spawned tasks, and a cancellation domain. Initialization
//! walks the nodes in topological order over data dependencies, entries
//! launch the root activities, and shutdown cancels and joins everything
//! the scope owns.
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowgraph::{GraphStore, NodeRegistry, Scope};
//!
//! # async fn run() -> Result<(), flowgraph::GraphError> {
//! let registry = NodeRegistry::with_builtins();
//! let graph = Arc::new(registry.parse(
//!   r#"{"name": "sum", "nodes": [
//!     {"type": "Value", "value": 5, "out": 1},
//!     {"type": "Add", "in_a": 1, "in_b": 1, "out": 2}
//!   ]}"#,
//! )?);
//!
//! let manager = Arc::new(GraphStore::new());
//! let scope = Scope::new(manager, graph)?;
//! scope.initialize().await?;
//! assert_eq!(scope.data_path(2).get_integer().await?, 10);
//! scope.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod path;
pub mod registry;
pub mod scope;
pub mod spec;
pub mod value;

pub use error::{GraphError, PathError};
pub use graph::{Graph, GraphDescription, GraphManager, GraphStore};
pub use node::{BoundaryRole, BoundarySpec, Node, NodeDescription};
pub use path::{ControlPath, DataPath, PathId};
pub use registry::NodeRegistry;
pub use scope::{Scope, ScopeId};
pub use spec::{NodeSpec, PortDirection, PortSpec};
pub use value::{Value, ValueKind};
