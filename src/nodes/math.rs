//! # Arithmetic Nodes
//!
//! Scalar arithmetic over dynamic values. Integer pairs stay integral,
//! anything numeric otherwise promotes to float, addition additionally
//! concatenates strings and lists. Operand pairs outside that are invalid
//! expressions, rendered infix in the error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GraphError, PathError};
use crate::node::{Node, NodeDescription};
use crate::nodes::live;
use crate::path::PathId;
use crate::scope::Scope;
use crate::spec::{NodeSpec, PortDirection, PortSpec};
use crate::value::Value;

/// The four binary arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
  Add,
  Subtract,
  Multiply,
  Divide,
}

impl ArithmeticOp {
  pub fn type_name(self) -> &'static str {
    match self {
      ArithmeticOp::Add => "Add",
      ArithmeticOp::Subtract => "Subtract",
      ArithmeticOp::Multiply => "Multiply",
      ArithmeticOp::Divide => "Divide",
    }
  }

  fn symbol(self) -> &'static str {
    match self {
      ArithmeticOp::Add => "+",
      ArithmeticOp::Subtract => "-",
      ArithmeticOp::Multiply => "*",
      ArithmeticOp::Divide => "/",
    }
  }

  /// Applies the operation to a pair of values.
  pub fn apply(self, a: &Value, b: &Value) -> Result<Value, PathError> {
    let invalid = || PathError::invalid_expression(format!("{a} {} {b}", self.symbol()));
    match (self, a, b) {
      (ArithmeticOp::Add, Value::String(a), b) => Ok(Value::String(format!("{a}{b}"))),
      (ArithmeticOp::Add, a, Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
      (ArithmeticOp::Add, Value::List(a), Value::List(b)) => {
        let mut joined = a.clone();
        joined.extend(b.iter().cloned());
        Ok(Value::List(joined))
      }
      (_, Value::Integer(a), Value::Integer(b)) => {
        let result = match self {
          ArithmeticOp::Add => a.checked_add(*b),
          ArithmeticOp::Subtract => a.checked_sub(*b),
          ArithmeticOp::Multiply => a.checked_mul(*b),
          ArithmeticOp::Divide => a.checked_div(*b),
        };
        result.map(Value::Integer).ok_or_else(invalid)
      }
      (_, a, b) if is_numeric(a) && is_numeric(b) => {
        let (a, b) = (a.as_float()?, b.as_float()?);
        let result = match self {
          ArithmeticOp::Add => a + b,
          ArithmeticOp::Subtract => a - b,
          ArithmeticOp::Multiply => a * b,
          ArithmeticOp::Divide => a / b,
        };
        Ok(Value::Float(result))
      }
      _ => Err(invalid()),
    }
  }
}

fn is_numeric(value: &Value) -> bool {
  matches!(value, Value::Integer(_) | Value::Float(_))
}

/// Binary arithmetic node; one type per [`ArithmeticOp`].
pub struct Arithmetic {
  op: ArithmeticOp,
  in_a: PathId,
  in_b: PathId,
  out: PathId,
}

impl Arithmetic {
  pub fn new(op: ArithmeticOp, in_a: PathId, in_b: PathId, out: PathId) -> Self {
    Self { op, in_a, in_b, out }
  }

  pub fn from_description(op: ArithmeticOp, description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(
      op,
      description.path_id("in_a")?,
      description.path_id("in_b")?,
      description.path_id("out")?,
    ))
  }
}

#[async_trait]
impl Node for Arithmetic {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      self.op.type_name(),
      vec![
        PortSpec::new("A", "in_a", PortDirection::DataIn),
        PortSpec::new("B", "in_b", PortDirection::DataIn),
        PortSpec::new("Result", "out", PortDirection::DataOut),
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
        op.apply(&a, &b)
      }
    })?;
    Ok(())
  }
}

/// Absolute value of a number.
pub struct Absolute {
  in_value: PathId,
  out: PathId,
}

impl Absolute {
  pub const TYPE: &'static str = "Absolute";

  pub fn new(in_value: PathId, out: PathId) -> Self {
    Self { in_value, out }
  }

  pub fn from_description(description: &NodeDescription) -> Result<Self, GraphError> {
    Ok(Self::new(description.path_id("in_value")?, description.path_id("out")?))
  }
}

#[async_trait]
impl Node for Absolute {
  fn spec(&self) -> NodeSpec {
    NodeSpec::new(
      Self::TYPE,
      vec![
        PortSpec::new("In", "in_value", PortDirection::DataIn),
        PortSpec::new("Result", "out", PortDirection::DataOut),
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
        let value = live(&weak, in_value)?.data_path(in_value).get().await?;
        match value {
          Value::Integer(value) => value
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| PathError::invalid_expression(format!("|{value}|"))),
          Value::Float(value) => Ok(Value::Float(value.abs())),
          other => Err(PathError::invalid_expression(format!("|{other}|"))),
        }
      }
    })?;
    Ok(())
  }
}
