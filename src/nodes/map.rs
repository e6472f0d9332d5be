//! # Map Nodes

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GraphError;
use crate::node::{Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::{Value, ValueKind};

/// Reads one entry of a map by key. A missing key reads as null rather
/// than failing, matching how missing literal fields read.
pub struct MapGet {
  in_map: PathId,
  in_key: PathId,
  out: PathId,
}

impl MapGet {
  pub const TYPE: &'static str = "MapGet";

  pub fn new(in_map: PathId, in_key: PathId, out: PathId) -> Self {
    Self { in_map, in_key, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in_map")?,
      description.path_id("in_key")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for MapGet {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("Map", "in_map", PortDirection::DataIn).of_kind(ValueKind::Map),
        PortSpec::new("Key", "in_key", PortDirection::DataIn).of_kind(ValueKind::String),
        PortSpec::new("Value", "out", PortDirection::DataOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_map, self.in_key]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (in_map, in_key) = (self.in_map, self.in_key);
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let scope = live(&weak, in_map)?;
        let map = scope.data_path(in_map).get_map().await?;
        let key = scope.data_path(in_key).get_string().await?;
        Ok(map.get(&key).cloned().unwrap_or(Value::Null))
      }
    })?;
    Ok(())
  }
}

/// Inserts an entry into a map, producing the extended map. An existing
/// entry under the same key is replaced.
pub struct MapSet {
  in_map: PathId,
  in_key: PathId,
  in_value: PathId,
  out: PathId,
}

impl MapSet {
  pub const TYPE: &'static str = "MapSet";

  pub fn new(in_map: PathId, in_key: PathId, in_value: PathId, out: PathId) -> Self {
    Self {
      in_map,
      in_key,
      in_value,
      out,
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in_map")?,
      description.path_id("in_key")?,
      description.path_id("in_value")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for MapSet {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("Map", "in_map", PortDirection::DataIn).of_kind(ValueKind::Map),
        PortSpec::new("Key", "in_key", PortDirection::DataIn).of_kind(ValueKind::String),
        PortSpec::new("Value", "in_value", PortDirection::DataIn),
        PortSpec::new("Map", "out", PortDirection::DataOut).of_kind(ValueKind::Map),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_map, self.in_key, self.in_value]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (in_map, in_key, in_value) = (self.in_map, self.in_key, self.in_value);
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let scope = live(&weak, in_map)?;
        let mut map = scope.data_path(in_map).get_map().await?;
        let key = scope.data_path(in_key).get_string().await?;
        map.insert(key, scope.data_path(in_value).get().await?);
        Ok(Value::Map(map))
      }
    })?;
    Ok(())
  }
}
