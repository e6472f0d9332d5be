//! # Control Flow Nodes
//!
//! Branch dispatches a control token by value, Select dispatches a data
//! read by value, For and ForEach drive a body control path once per
//! iteration. Loop bodies run to completion before the next iteration
//! starts, and the exit path fires only after the last iteration; a body
//! error stops the loop and propagates without firing the exit.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GraphError, PathError};
use crate::node::{Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::{Value, ValueKind};

/// Routes an incoming control token to the output whose case value equals
/// the selector. Unmatched selectors take the default output when one is
/// wired and are swallowed otherwise.
pub struct Branch {
  in_control: PathId,
  in_value: PathId,
  cases: Vec<(Value, PathId)>,
  default: Option<PathId>,
}

impl Branch {
  pub const TYPE: &'static str = "Branch";

  pub fn new(in_control: PathId, in_value: PathId, cases: Vec<(Value, PathId)>, default: Option<PathId>) -> Self {
    Self {
      in_control,
      in_value,
      cases,
      default,
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in")?,
      description.path_id("in_value")?,
      description.path_table("out")?,
      description.opt_path_id("out_default")?,
    ))
  }
}

#[async_trait]
impl Node for Branch {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("In", "in", PortDirection::ControlIn),
        PortSpec::new("Selector", "in_value", PortDirection::DataIn),
        PortSpec::new("Cases", "out", PortDirection::ControlOut).multi(),
        PortSpec::new("Default", "out_default", PortDirection::ControlOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_value]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let in_value = self.in_value;
    let cases = self.cases.clone();
    let default = self.default;
    scope.control_path(self.in_control).declare(move || {
      let weak = weak.clone();
      let cases = cases.clone();
      async move {
        let Some(scope) = weak.upgrade() else {
          return Ok(());
        };
        let selector = scope.data_path(in_value).get().await?;
        let target = cases
          .iter()
          .find(|(case, _)| *case == selector)
          .map(|(_, id)| *id)
          .or(default);
        match target {
          Some(id) => scope.control_path(id).invoke().await,
          None => Ok(()),
        }
      }
    });
    Ok(())
  }
}

/// Produces the value of the input whose case value equals the selector.
/// Unmatched selectors read the default input when one is wired and read
/// as undefined otherwise.
pub struct Select {
  in_value: PathId,
  cases: Vec<(Value, PathId)>,
  default: Option<PathId>,
  out: PathId,
}

impl Select {
  pub const TYPE: &'static str = "Select";

  pub fn new(in_value: PathId, cases: Vec<(Value, PathId)>, default: Option<PathId>, out: PathId) -> Self {
    Self {
      in_value,
      cases,
      default,
      out,
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in_value")?,
      description.path_table("in")?,
      description.opt_path_id("in_default")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for Select {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("Selector", "in_value", PortDirection::DataIn),
        PortSpec::new("Cases", "in", PortDirection::DataIn).multi(),
        PortSpec::new("Default", "in_default", PortDirection::DataIn),
        PortSpec::new("Out", "out", PortDirection::DataOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    let mut ids = vec![self.in_value];
    ids.extend(self.cases.iter().map(|(_, id)| *id));
    ids.extend(self.default);
    ids
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let in_value = self.in_value;
    let cases = self.cases.clone();
    let default = self.default;
    let out = self.out;
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      let cases = cases.clone();
      async move {
        let scope = live(&weak, out)?;
        let selector = scope.data_path(in_value).get().await?;
        let source = cases
          .iter()
          .find(|(case, _)| *case == selector)
          .map(|(_, id)| *id)
          .or(default)
          .ok_or(PathError::Undefined(out))?;
        scope.data_path(source).get().await
      }
    })?;
    Ok(())
  }
}

/// Counted loop over an integer range, end-exclusive. The current index is
/// published on the value output before each body run.
pub struct For {
  in_control: PathId,
  in_start: PathId,
  in_end: PathId,
  out_body: PathId,
  out_value: PathId,
  out: PathId,
}

impl For {
  pub const TYPE: &'static str = "For";

  pub fn new(
    in_control: PathId,
    in_start: PathId,
    in_end: PathId,
    out_body: PathId,
    out_value: PathId,
    out: PathId,
  ) -> Self {
    Self {
      in_control,
      in_start,
      in_end,
      out_body,
      out_value,
      out,
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in")?,
      description.path_id("in_range_start")?,
      description.path_id("in_range_end")?,
      description.path_id("out_body")?,
      description.path_id("out_value")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for For {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("In", "in", PortDirection::ControlIn),
        PortSpec::new("Start", "in_range_start", PortDirection::DataIn).of_kind(ValueKind::Integer),
        PortSpec::new("End", "in_range_end", PortDirection::DataIn).of_kind(ValueKind::Integer),
        PortSpec::new("Body", "out_body", PortDirection::ControlOut),
        PortSpec::new("Index", "out_value", PortDirection::DataOut).of_kind(ValueKind::Integer),
        PortSpec::new("Exit", "out", PortDirection::ControlOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_start, self.in_end]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out_value]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (in_start, in_end) = (self.in_start, self.in_end);
    let (out_body, out_value, out) = (self.out_body, self.out_value, self.out);
    scope.control_path(self.in_control).declare(move || {
      let weak = weak.clone();
      async move {
        let Some(scope) = weak.upgrade() else {
          return Ok(());
        };
        let start = scope.data_path(in_start).get_integer().await?;
        let end = scope.data_path(in_end).get_integer().await?;
        for index in start..end {
          scope.data_path(out_value).store(Value::Integer(index))?;
          scope.control_path(out_body).invoke().await?;
        }
        scope.control_path(out).invoke().await
      }
    });
    Ok(())
  }
}

/// Loop over the elements of a list. The current element is published on
/// the value output before each body run.
pub struct ForEach {
  in_control: PathId,
  in_value: PathId,
  out_body: PathId,
  out_value: PathId,
  out: PathId,
}

impl ForEach {
  pub const TYPE: &'static str = "ForEach";

  pub fn new(in_control: PathId, in_value: PathId, out_body: PathId, out_value: PathId, out: PathId) -> Self {
    Self {
      in_control,
      in_value,
      out_body,
      out_value,
      out,
    }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      description.path_id("in")?,
      description.path_id("in_value")?,
      description.path_id("out_body")?,
      description.path_id("out_value")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for ForEach {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("In", "in", PortDirection::ControlIn),
        PortSpec::new("List", "in_value", PortDirection::DataIn).of_kind(ValueKind::List),
        PortSpec::new("Body", "out_body", PortDirection::ControlOut),
        PortSpec::new("Element", "out_value", PortDirection::DataOut),
        PortSpec::new("Exit", "out", PortDirection::ControlOut),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_value]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out_value]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let in_value = self.in_value;
    let (out_body, out_value, out) = (self.out_body, self.out_value, self.out);
    scope.control_path(self.in_control).declare(move || {
      let weak = weak.clone();
      async move {
        let Some(scope) = weak.upgrade() else {
          return Ok(());
        };
        let elements = scope.data_path(in_value).get_list().await?;
        for element in elements {
          scope.data_path(out_value).store(element)?;
          scope.control_path(out_body).invoke().await?;
        }
        scope.control_path(out).invoke().await
      }
    });
    Ok(())
  }
}
