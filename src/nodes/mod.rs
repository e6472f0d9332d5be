//! # Built-in Node Types
//!
//! The node taxonomy: entries, tasks, data producers, arithmetic, logic,
//! list and map operations, control flow, and graph nesting. Every type here is
//! registered by [`NodeRegistry::with_builtins`](crate::registry::NodeRegistry::with_builtins).

pub mod control;
pub mod data;
pub mod entry;
pub mod list;
pub mod logic;
pub mod map;
pub mod math;
pub mod nesting;
pub mod task;

use std::sync::{Arc, Weak};

use crate::error::PathError;
use crate::path::PathId;
use crate::scope::Scope;

/// Upgrades the weak scope reference a stored callback carries. A dead
/// scope reads as an undefined path, which is what a read after teardown
/// deserves.
pub(crate) fn live(scope: &Weak<Scope>, id: PathId) -> Result<Arc<Scope>, PathError> {
  scope.upgrade().ok_or(PathError::Undefined(id))
}
