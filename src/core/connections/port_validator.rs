use crate::core::components::port_specs::PortDirection;
use crate::core::connections::registry::Port;
use crate::core::errors::ConfigurationError;

/// Port validation utilities for links and bindings
pub struct PortValidator;

impl PortValidator {
    /// Validate that `port` is an output port able to drive a link
    pub fn validate_source_port(device: &str, port: &Port) -> Result<(), ConfigurationError> {
        Self::validate_direction(device, port, PortDirection::Output)
    }

    /// Validate that `port` is an input port able to receive a link
    pub fn validate_target_port(device: &str, port: &Port) -> Result<(), ConfigurationError> {
        Self::validate_direction(device, port, PortDirection::Input)
    }

    /// Validate that both ends of a link carry the same value type
    pub fn validate_types(
        source_device: &str,
        source: &Port,
        target_device: &str,
        target: &Port,
    ) -> Result<(), ConfigurationError> {
        if source.value_type != target.value_type {
            return Err(ConfigurationError::TypeMismatch {
                source_port: format!("{}.{}", source_device, source.name),
                source_type: source.value_type,
                target_port: format!("{}.{}", target_device, target.name),
                target_type: target.value_type,
            });
        }
        Ok(())
    }

    /// Validate that a port has the direction a caller expects
    pub fn validate_direction(
        device: &str,
        port: &Port,
        expected: PortDirection,
    ) -> Result<(), ConfigurationError> {
        if port.direction != expected {
            return Err(ConfigurationError::DirectionMismatch {
                device: device.to_string(),
                port: port.name.clone(),
                expected,
                actual: port.direction,
            });
        }
        Ok(())
    }
}
