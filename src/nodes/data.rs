//! # Data Producer Nodes

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GraphError;
use crate::node::{Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::Value;

/// Produces a literal constant on its output path.
pub struct ValueNode {
  value: Value,
  out: PathId,
}

impl ValueNode {
  pub const TYPE: &'static str = "Value";

  pub fn new(value: Value, out: PathId) -> Self {
    Self { value, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(description.constant("value")?, description.path_id("out")?))
  }
}

#[async_trait]
impl Node for ValueNode {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("Value", "value", PortDirection::Const),
        PortSpec::new("Out", "out", PortDirection::DataOut),
      ],
    )
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    scope.data_path(self.out).set_value(self.value.clone())?;
    Ok(())
  }
}

/// Passes its input through, evaluating the upstream producer at most once
/// per scope lifetime. Everything downstream of a cache observes one
/// consistent value no matter how often or how concurrently it reads.
pub struct Cache {
  in_value: PathId,
  out: PathId,
}

impl Cache {
  pub const TYPE: &'static str = "Cache";

  pub fn new(in_value: PathId, out: PathId) -> Self {
    Self { in_value, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(description.path_id("in_value")?, description.path_id("out")?))
  }
}

#[async_trait]
impl Node for Cache {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("In", "in_value", PortDirection::DataIn),
        PortSpec::new("Out", "out", PortDirection::DataOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_value]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let in_value = self.in_value;
    scope.data_path(self.out).set_thunk_memoized(move || {
      let weak = weak.clone();
      async move { live(&weak, in_value)?.data_path(in_value).get().await }
    })?;
    Ok(())
  }
}
