//! # List Nodes

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GraphError;
use crate::node::{Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::{Value, ValueKind};

/// Reads one element of a list. Out-of-range indices read as null rather
/// than failing, matching how missing literal fields read.
pub struct ListGet {
  in_list: PathId,
  in_index: PathId,
  out: PathId,
}

impl ListGet {
  pub const TYPE: &'static str = "ListGet";

  pub fn new(in_list: PathId, in_index: PathId, out: PathId) -> Self {
    Self { in_list, in_index, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in_list")?,
      description.path_id("in_index")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for ListGet {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("List", "in_list", PortDirection::DataIn).of_kind(ValueKind::List),
        PortSpec::new("Index", "in_index", PortDirection::DataIn).of_kind(ValueKind::Integer),
        PortSpec::new("Element", "out", PortDirection::DataOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_list, self.in_index]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (in_list, in_index) = (self.in_list, self.in_index);
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let scope = live(&weak, in_list)?;
        let list = scope.data_path(in_list).get_list().await?;
        let index = scope.data_path(in_index).get_integer().await?;
        let element = usize::try_from(index)
          .ok()
          .and_then(|index| list.get(index).cloned())
          .unwrap_or(Value::Null);
        Ok(element)
      }
    })?;
    Ok(())
  }
}

/// Appends an element to a list, producing the extended list.
pub struct ListAdd {
  in_list: PathId,
  in_item: PathId,
  out: PathId,
}

impl ListAdd {
  pub const TYPE: &'static str = "ListAdd";

  pub fn new(in_list: PathId, in_item: PathId, out: PathId) -> Self {
    Self { in_list, in_item, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in_list")?,
      description.path_id("in_item")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for ListAdd {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("List", "in_list", PortDirection::DataIn).of_kind(ValueKind::List),
        PortSpec::new("Item", "in_item", PortDirection::DataIn),
        PortSpec::new("List", "out", PortDirection::DataOut).of_kind(ValueKind::List),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_list, self.in_item]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (in_list, in_item) = (self.in_list, self.in_item);
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let scope = live(&weak, in_list)?;
        let mut list = scope.data_path(in_list).get_list().await?;
        list.push(scope.data_path(in_item).get().await?);
        Ok(Value::List(list))
      }
    })?;
    Ok(())
  }
}
