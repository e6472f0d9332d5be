//! # Node Type Descriptors
//!
//! Every node type publishes a static descriptor of its ports: the json key
//! each port binds under, its direction, and optionally the value kind it
//! carries. Descriptors serve three consumers:
//!
//! - graph assembly reads port path ids out of raw node descriptions,
//! - initialization ordering derives data-dependency edges from the in-data
//!   and out-data ports of each node,
//! - external tooling receives descriptors through graph spec export.

use serde::{Deserialize, Serialize};

use crate::value::ValueKind;

/// Direction and role of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
  /// Incoming control trigger; the node declares callbacks on it.
  ControlIn,
  /// Outgoing control trigger; the node invokes it.
  ControlOut,
  /// Incoming data dependency; the node reads it.
  DataIn,
  /// Outgoing data production; the node binds its producer.
  DataOut,
  /// Inline constant in the node description, not a path at all.
  Const,
}

impl PortDirection {
  /// Whether this port names a path id in the description (constants
  /// carry literal values instead).
  pub fn is_path(self) -> bool {
    !matches!(self, PortDirection::Const)
  }
}

/// Descriptor of one port of a node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
  /// Human-readable port name.
  pub name: String,
  /// Json key the port binds under in node descriptions.
  pub key: String,
  /// Direction and role.
  pub direction: PortDirection,
  /// Value kind carried, when the node type constrains it.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kind: Option<ValueKind>,
  /// Whether the key holds a value-to-path map rather than a single path
  /// id, as in the dispatch tables of Branch and Select.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub multi: bool,
}

impl PortSpec {
  pub fn new(name: &str, key: &str, direction: PortDirection) -> Self {
    Self {
      name: name.to_string(),
      key: key.to_string(),
      direction,
      kind: None,
      multi: false,
    }
  }

  /// Tags the port with the value kind it carries.
  pub fn of_kind(mut self, kind: ValueKind) -> Self {
    self.kind = Some(kind);
    self
  }

  /// Marks the port as a value-to-path map.
  pub fn multi(mut self) -> Self {
    self.multi = true;
    self
  }
}

/// Descriptor of a whole node type: its discriminator string and ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
  /// The `type` discriminator used in node descriptions.
  pub type_name: String,
  /// Ports in declaration order.
  pub ports: Vec<PortSpec>,
}

impl NodeSpec {
  pub fn new(type_name: &str, ports: Vec<PortSpec>) -> Self {
    Self {
      type_name: type_name.to_string(),
      ports,
    }
  }

  /// Ports with the given direction.
  pub fn ports_with(&self, direction: PortDirection) -> impl Iterator<Item = &PortSpec> {
    self.ports.iter().filter(move |port| port.direction == direction)
  }
}
