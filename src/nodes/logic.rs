//! # Logic Nodes
//!
//! Relational comparison over the total value ordering, plus boolean
//! connectives. Equality is defined for every value pair; the relational
//! operators surface incomparable pairs as invalid expressions. And/Or
//! short-circuit, so the second operand of a decided connective is never
//! pulled.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GraphError, PathError};
use crate::node::{Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::{Value, ValueKind};

/// The six relational operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Equal,
  NotEqual,
  LessThan,
  LessThanOrEqual,
  GreaterThan,
  GreaterThanOrEqual,
}

impl CompareOp {
  pub fn type_name(self) -> &'static str {
    match self {
      CompareOp::Equal => "Equal",
      CompareOp::NotEqual => "NotEqual",
      CompareOp::LessThan => "LessThan",
      CompareOp::LessThanOrEqual => "LessThanOrEqual",
      CompareOp::GreaterThan => "GreaterThan",
      CompareOp::GreaterThanOrEqual => "GreaterThanOrEqual",
    }
  }

  fn symbol(self) -> &'static str {
    match self {
      CompareOp::Equal => "==",
      CompareOp::NotEqual => "!=",
      CompareOp::LessThan => "<",
      CompareOp::LessThanOrEqual => "<=",
      CompareOp::GreaterThan => ">",
      CompareOp::GreaterThanOrEqual => ">=",
    }
  }

  /// Applies the comparison to a pair of values.
  pub fn apply(self, a: &Value, b: &Value) -> Result<bool, PathError> {
    match self {
      CompareOp::Equal => Ok(a == b),
      CompareOp::NotEqual => Ok(a != b),
      relational => {
        let ordering = a
          .compare(b)
          .ok_or_else(|| PathError::invalid_expression(format!("{a} {} {b}", self.symbol())))?;
        Ok(match relational {
          CompareOp::LessThan => ordering == Ordering::Less,
          CompareOp::LessThanOrEqual => ordering != Ordering::Greater,
          CompareOp::GreaterThan => ordering == Ordering::Greater,
          CompareOp::GreaterThanOrEqual => ordering != Ordering::Less,
          CompareOp::Equal | CompareOp::NotEqual => unreachable!(),
        })
      }
    }
  }
}

/// Binary comparison node; one type per [`CompareOp`].
pub struct Compare {
  op: CompareOp,
  in_a: PathId,
  in_b: PathId,
  out: PathId,
}

impl Compare {
  pub fn new(op: CompareOp, in_a: PathId, in_b: PathId, out: PathId) -> Self {
    Self { op, in_a, in_b, out }
  }

  pub fn from_description(op: CompareOp, description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      op,
      description.path_id("in_a")?,
      description.path_id("in_b")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for Compare {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      self.op.type_name(),
      vec![
        PortSpec::new("A", "in_a", PortDirection::DataIn),
        PortSpec::new("B", "in_b", PortDirection::DataIn),
        PortSpec::new("Result", "out", PortDirection::DataOut).of_kind(ValueKind::Bool),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_a, self.in_b]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (op, in_a, in_b) = (self.op, self.in_a, self.in_b);
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let scope = live(&weak, in_a)?;
        let a = scope.data_path(in_a).get().await?;
        let b = scope.data_path(in_b).get().await?;
        op.apply(&a, &b).map(Value::Bool)
      }
    })?;
    Ok(())
  }
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
  And,
  Or,
}

impl BooleanOp {
  pub fn type_name(self) -> &'static str {
    match self {
      BooleanOp::And => "And",
      BooleanOp::Or => "Or",
    }
  }
}

/// Short-circuiting boolean connective node.
pub struct Logical {
  op: BooleanOp,
  in_a: PathId,
  in_b: PathId,
  out: PathId,
}

impl Logical {
  pub fn new(op: BooleanOp, in_a: PathId, in_b: PathId, out: PathId) -> Self {
    Self { op, in_a, in_b, out }
  }

  pub fn from_description(op: BooleanOp, description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      op,
      description.path_id("in_a")?,
      description.path_id("in_b")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for Logical {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      self.op.type_name(),
      vec![
        PortSpec::new("A", "in_a", PortDirection::DataIn).of_kind(ValueKind::Bool),
        PortSpec::new("B", "in_b", PortDirection::DataIn).of_kind(ValueKind::Bool),
        PortSpec::new("Result", "out", PortDirection::DataOut).of_kind(ValueKind::Bool),
      ],
    )
  }

  fn requirements(&self) -> Vec<PathId> {
    vec![self.in_a, self.in_b]
  }

  fn productions(&self) -> Vec<PathId> {
    vec![self.out]
  }

  async fn initialize(&self, scope: &Arc<Scope>) -> Result<(), GraphError> {
    let weak = Arc::downgrade(scope);
    let (op, in_a, in_b) = (self.op, self.in_a, self.in_b);
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let scope = live(&weak, in_a)?;
        let a = scope.data_path(in_a).get_bool().await?;
        let decided = match op {
          BooleanOp::And => !a,
          BooleanOp::Or => a,
        };
        if decided {
          return Ok(Value::Bool(a));
        }
        Ok(Value::Bool(scope.data_path(in_b).get_bool().await?))
      }
    })?;
    Ok(())
  }
}

/// Boolean negation.
pub struct Not {
  in_value: PathId,
  out: PathId,
}

impl Not {
  pub const TYPE: &'static str = "Not";

  pub fn new(in_value: PathId, out: PathId) -> Self {
    Self { in_value, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(description.path_id("in_value")?, description.path_id("out")?))
  }
}

#[async_trait]
impl Node for Not {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("In", "in_value", PortDirection::DataIn).of_kind(ValueKind::Bool),
        PortSpec::new("Result", "out", PortDirection::DataOut).of_kind(ValueKind::Bool),
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
    scope.data_path(self.out).set_thunk(move || {
      let weak = weak.clone();
      async move {
        let value = live(&weak, in_value)?.data_path(in_value).get_bool().await?;
        Ok(Value::Bool(!value))
      }
    })?;
    Ok(())
  }
}
