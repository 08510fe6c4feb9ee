use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::values::{Value, ValueType};

/// Direction of a device port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Written by an upstream link or an external client
    Input,
    /// Computed by the device during its update
    Output,
}

impl PortDirection {
    /// Check if a port of this direction can drive a port of the other direction
    pub fn can_connect_to(&self, other: &PortDirection) -> bool {
        matches!((self, other), (PortDirection::Output, PortDirection::Input))
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Port declaration for a device's inputs and outputs
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    /// Port name, unique per device
    pub name: String,
    /// Input or output
    pub direction: PortDirection,
    /// Value type, fixed for the device lifetime
    pub value_type: ValueType,
    /// Value held before the first tick
    pub initial: Value,
}

impl PortSpec {
    /// Create an input port seeded with the type's zero value
    pub fn input(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Input,
            value_type,
            initial: value_type.default_value(),
        }
    }

    /// Create an output port seeded with the type's zero value
    pub fn output(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Output,
            value_type,
            initial: value_type.default_value(),
        }
    }

    /// Replace the initial value
    pub fn with_initial(mut self, initial: impl Into<Value>) -> Self {
        self.initial = initial.into();
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_output_to_input_connects() {
        assert!(PortDirection::Output.can_connect_to(&PortDirection::Input));
        assert!(!PortDirection::Input.can_connect_to(&PortDirection::Output));
        assert!(!PortDirection::Output.can_connect_to(&PortDirection::Output));
    }

    #[test]
    fn test_port_spec_initial_value() {
        let spec = PortSpec::output("position", ValueType::Float).with_initial(1.5);
        assert!(spec.is_output());
        assert_eq!(spec.initial, Value::Float(1.5));
        assert_eq!(PortSpec::input("gate", ValueType::Bool).initial, Value::Bool(false));
    }
}
