//! # Dynamic Port Values
//!
//! Values flowing through data paths are dynamically typed: a closed tagged
//! union over the kinds a declarative graph document can express (null,
//! booleans, numbers, strings, byte sequences, lists, maps) plus an opaque
//! handle kind for in-process resources that never cross the wire.
//!
//! Conversion between kinds is explicit and as total as the kinds allow:
//! every accessor first checks for an exact tag match and then falls back to
//! a structural conversion (the same conversion used when reading literals
//! out of a deserialized graph document). Conversions that cannot produce a
//! sensible result fail with [`PathError::InvalidExpression`].
//!
//! Relational comparison is a single partial function over value pairs;
//! nodes that need an ordering treat `None` as an invalid expression.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// The kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
  /// The absent value.
  Null,
  /// A boolean.
  Bool,
  /// A signed 64-bit integer.
  Integer,
  /// A 64-bit float.
  Float,
  /// A UTF-8 string.
  String,
  /// A raw byte sequence.
  Bytes,
  /// An ordered list of values.
  List,
  /// A string-keyed map of values.
  Map,
  /// An opaque in-process handle; never serialized.
  Handle,
}

/// A dynamically typed port value.
#[derive(Clone, Default)]
pub enum Value {
  /// The absent value. Also what missing literal fields read as.
  #[default]
  Null,
  /// A boolean.
  Bool(bool),
  /// A signed 64-bit integer.
  Integer(i64),
  /// A 64-bit float.
  Float(f64),
  /// A UTF-8 string.
  String(String),
  /// A raw byte sequence.
  Bytes(Vec<u8>),
  /// An ordered list of values.
  List(Vec<Value>),
  /// A string-keyed map of values.
  Map(BTreeMap<String, Value>),
  /// An opaque in-process handle (device, connection, ...). Compared by
  /// identity, rendered opaquely, converted to nothing.
  Handle(Arc<dyn Any + Send + Sync>),
}

impl Value {
  /// Returns the kind tag of this value.
  pub fn kind(&self) -> ValueKind {
    match self {
      Value::Null => ValueKind::Null,
      Value::Bool(_) => ValueKind::Bool,
      Value::Integer(_) => ValueKind::Integer,
      Value::Float(_) => ValueKind::Float,
      Value::String(_) => ValueKind::String,
      Value::Bytes(_) => ValueKind::Bytes,
      Value::List(_) => ValueKind::List,
      Value::Map(_) => ValueKind::Map,
      Value::Handle(_) => ValueKind::Handle,
    }
  }

  /// Builds a value from a deserialized JSON literal.
  ///
  /// Integral JSON numbers become [`Value::Integer`], everything else
  /// numeric becomes [`Value::Float`]. JSON has no bytes or handle kind.
  pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(value) => Value::Bool(*value),
      serde_json::Value::Number(value) => {
        if let Some(integer) = value.as_i64() {
          Value::Integer(integer)
        } else {
          Value::Float(value.as_f64().unwrap_or(f64::NAN))
        }
      }
      serde_json::Value::String(value) => Value::String(value.clone()),
      serde_json::Value::Array(values) => Value::List(values.iter().map(Value::from_json).collect()),
      serde_json::Value::Object(values) => Value::Map(
        values
          .iter()
          .map(|(key, value)| (key.clone(), Value::from_json(value)))
          .collect(),
      ),
    }
  }

  /// Renders this value as a JSON literal. Bytes become a number array,
  /// handles become null.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Null | Value::Handle(_) => serde_json::Value::Null,
      Value::Bool(value) => serde_json::Value::Bool(*value),
      Value::Integer(value) => serde_json::Value::from(*value),
      Value::Float(value) => serde_json::Value::from(*value),
      Value::String(value) => serde_json::Value::String(value.clone()),
      Value::Bytes(bytes) => serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect()),
      Value::List(values) => serde_json::Value::Array(values.iter().map(Value::to_json).collect()),
      Value::Map(values) => serde_json::Value::Object(
        values
          .iter()
          .map(|(key, value)| (key.clone(), value.to_json()))
          .collect(),
      ),
    }
  }

  /// Converts this value to a boolean.
  ///
  /// Every kind converts: null is false, numbers are compared against
  /// zero, containers and strings are tested for emptiness, handles are
  /// true.
  pub fn as_bool(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(value) => *value,
      Value::Integer(value) => *value != 0,
      Value::Float(value) => *value != 0.0,
      Value::String(value) => !value.is_empty(),
      Value::Bytes(bytes) => !bytes.is_empty(),
      Value::List(values) => !values.is_empty(),
      Value::Map(values) => !values.is_empty(),
      Value::Handle(_) => true,
    }
  }

  /// Converts this value to an integer.
  ///
  /// Floats truncate, booleans map to 0/1, strings parse. Anything else
  /// fails with an invalid-expression error.
  pub fn as_integer(&self) -> Result<i64, PathError> {
    match self {
      Value::Bool(value) => Ok(i64::from(*value)),
      Value::Integer(value) => Ok(*value),
      Value::Float(value) if value.is_finite() => Ok(*value as i64),
      Value::String(value) => value
        .trim()
        .parse::<i64>()
        .map_err(|_| PathError::invalid_expression(format!("{self} as integer"))),
      _ => Err(PathError::invalid_expression(format!("{self} as integer"))),
    }
  }

  /// Converts this value to a float. Same fallbacks as [`Value::as_integer`].
  pub fn as_float(&self) -> Result<f64, PathError> {
    match self {
      Value::Bool(value) => Ok(if *value { 1.0 } else { 0.0 }),
      Value::Integer(value) => Ok(*value as f64),
      Value::Float(value) => Ok(*value),
      Value::String(value) => value
        .trim()
        .parse::<f64>()
        .map_err(|_| PathError::invalid_expression(format!("{self} as number"))),
      _ => Err(PathError::invalid_expression(format!("{self} as number"))),
    }
  }

  /// Converts this value to a string. Total: non-string kinds render the
  /// way [`fmt::Display`] renders them.
  pub fn as_string(&self) -> String {
    match self {
      Value::String(value) => value.clone(),
      other => other.to_string(),
    }
  }

  /// Converts this value to a list.
  ///
  /// Lists clone, byte sequences widen to integer lists, maps yield their
  /// values in key order, null is the empty list, and any scalar wraps
  /// into a single-element list.
  pub fn as_list(&self) -> Vec<Value> {
    match self {
      Value::Null => Vec::new(),
      Value::List(values) => values.clone(),
      Value::Bytes(bytes) => bytes.iter().map(|b| Value::Integer(i64::from(*b))).collect(),
      Value::Map(values) => values.values().cloned().collect(),
      other => vec![other.clone()],
    }
  }

  /// Converts this value to a map. Only maps convert; everything else
  /// fails with an invalid-expression error.
  pub fn as_map(&self) -> Result<BTreeMap<String, Value>, PathError> {
    match self {
      Value::Map(values) => Ok(values.clone()),
      _ => Err(PathError::invalid_expression(format!("{self} as map"))),
    }
  }

  /// Converts this value to a byte sequence. Strings yield their UTF-8
  /// bytes, integer lists narrow element-wise.
  pub fn as_bytes(&self) -> Result<Vec<u8>, PathError> {
    match self {
      Value::Bytes(bytes) => Ok(bytes.clone()),
      Value::String(value) => Ok(value.as_bytes().to_vec()),
      Value::List(values) => values
        .iter()
        .map(|value| {
          let integer = value.as_integer()?;
          u8::try_from(integer).map_err(|_| PathError::invalid_expression(format!("{value} as byte")))
        })
        .collect(),
      _ => Err(PathError::invalid_expression(format!("{self} as bytes"))),
    }
  }

  /// Downcasts a handle value to a concrete type.
  pub fn as_handle<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
    match self {
      Value::Handle(handle) => handle.clone().downcast::<T>().ok(),
      _ => None,
    }
  }

  /// Relational comparison between two values.
  ///
  /// Numbers compare across integer/float, strings and byte sequences
  /// compare lexicographically, booleans false-before-true, lists
  /// element-wise. `None` means the pair is not comparable; relational
  /// nodes surface that as an invalid expression.
  pub fn compare(&self, other: &Value) -> Option<Ordering> {
    match (self, other) {
      (Value::Null, Value::Null) => Some(Ordering::Equal),
      (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
      (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
      (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
      (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
      (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
      (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
      (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
      (Value::List(a), Value::List(b)) => {
        for (left, right) in a.iter().zip(b.iter()) {
          match left.compare(right)? {
            Ordering::Equal => continue,
            unequal => return Some(unequal),
          }
        }
        Some(a.len().cmp(&b.len()))
      }
      (Value::Handle(a), Value::Handle(b)) => {
        if Arc::ptr_eq(a, b) {
          Some(Ordering::Equal)
        } else {
          None
        }
      }
      _ => None,
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Map(a), Value::Map(b)) => a == b,
      _ => self.compare(other) == Some(Ordering::Equal),
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "Null"),
      Value::Bool(value) => write!(f, "Bool({value})"),
      Value::Integer(value) => write!(f, "Integer({value})"),
      Value::Float(value) => write!(f, "Float({value})"),
      Value::String(value) => write!(f, "String({value:?})"),
      Value::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
      Value::List(values) => f.debug_tuple("List").field(values).finish(),
      Value::Map(values) => f.debug_tuple("Map").field(values).finish(),
      Value::Handle(_) => write!(f, "Handle(..)"),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Bool(value) => write!(f, "{value}"),
      Value::Integer(value) => write!(f, "{value}"),
      Value::Float(value) => write!(f, "{value}"),
      Value::String(value) => write!(f, "{value}"),
      Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
      Value::List(values) => {
        write!(f, "[")?;
        for (index, value) in values.iter().enumerate() {
          if index > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{value}")?;
        }
        write!(f, "]")
      }
      Value::Map(values) => {
        write!(f, "{{")?;
        for (index, (key, value)) in values.iter().enumerate() {
          if index > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
      }
      Value::Handle(_) => write!(f, "<handle>"),
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Integer(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Float(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<Vec<Value>> for Value {
  fn from(values: Vec<Value>) -> Self {
    Value::List(values)
  }
}
