//! # Error Types
//!
//! Error taxonomy for the flow runtime. Path errors (`PathError`) cover
//! everything that can go wrong on a wire at bind time or at read/invoke
//! time; graph errors (`GraphError`) cover construction and initialization
//! of whole graphs.
//!
//! Binding errors (`AlreadySet`) are detected eagerly and are fatal to the
//! graph instance being initialized. Read errors (`Undefined`, invalid
//! expressions) are detected lazily at first use and propagate to the
//! reader rather than tearing down the scope.

use thiserror::Error;

use crate::path::PathId;

/// Error raised on a control or data path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
  /// A data path received a second producer. Graph-authoring error,
  /// detected eagerly when the second producer binds.
  #[error("data path {0} already has a producer")]
  AlreadySet(PathId),

  /// A data path was read without any producer ever having been bound.
  /// Detected lazily at first read.
  #[error("data path {0} is undefined")]
  Undefined(PathId),

  /// An operation was applied to operands it is not defined for, e.g. a
  /// relational comparison between incompatible value kinds. Carries a
  /// human-readable rendering of the offending expression.
  #[error("invalid expression: {0}")]
  InvalidExpression(String),
}

impl PathError {
  /// Builds a [`PathError::InvalidExpression`] from a displayable
  /// rendering of the offending expression.
  pub fn invalid_expression(expression: impl Into<String>) -> Self {
    PathError::InvalidExpression(expression.into())
  }
}

/// Error raised while constructing or initializing a graph.
#[derive(Debug, Error)]
pub enum GraphError {
  /// A path error surfaced during node initialization (typically
  /// [`PathError::AlreadySet`] from a duplicate producer).
  #[error(transparent)]
  Path(#[from] PathError),

  /// A node description is missing a field or carries a field of the
  /// wrong shape.
  #[error("malformed description for node type '{node_type}': {reason}")]
  Description {
    /// The `type` discriminator of the offending node.
    node_type: String,
    /// What was wrong with it.
    reason: String,
  },

  /// The declarative graph document could not be deserialized at all.
  #[error("failed to parse graph description: {0}")]
  Parse(#[from] serde_json::Error),

  /// The scope's executor thread could not be started.
  #[error("failed to start scope executor: {0}")]
  Executor(#[from] std::io::Error),
}

impl GraphError {
  /// Builds a [`GraphError::Description`] for the given node type.
  pub fn description(node_type: impl Into<String>, reason: impl Into<String>) -> Self {
    GraphError::Description {
      node_type: node_type.into(),
      reason: reason.into(),
    }
  }
}
