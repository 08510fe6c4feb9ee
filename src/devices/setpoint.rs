use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;

/// Configuration of a [`SetpointDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SetpointConfig {
    pub initial: f64,
    /// Lowest accepted setpoint; unbounded when absent
    pub low: Option<f64>,
    /// Highest accepted setpoint; unbounded when absent
    pub high: Option<f64>,
}

impl Default for SetpointConfig {
    fn default() -> Self {
        Self {
            initial: 0.0,
            low: None,
            high: None,
        }
    }
}

/// Setpoint with an immediate readback.
///
/// The readback follows the setpoint within the same tick. A setpoint outside
/// `[low, high]` is rejected and the readback keeps its last value.
#[derive(Debug, Clone)]
pub struct SetpointDevice {
    config: SetpointConfig,
}

impl SetpointDevice {
    pub const TYPE_TAG: &'static str = "setpoint";

    pub fn new(config: SetpointConfig) -> Result<Self, String> {
        if let (Some(low), Some(high)) = (config.low, config.high) {
            if low > high {
                return Err(format!("low limit {} is above high limit {}", low, high));
            }
        }
        Ok(Self { config })
    }
}

impl Device for SetpointDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("setpoint", ValueType::Float).with_initial(self.config.initial),
            PortSpec::output("readback", ValueType::Float).with_initial(self.config.initial),
        ]
    }

    fn update(&mut self, inputs: &Inputs, _ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let setpoint = inputs.float("setpoint")?;
        let low = self.config.low.unwrap_or(f64::NEG_INFINITY);
        let high = self.config.high.unwrap_or(f64::INFINITY);
        if !(low..=high).contains(&setpoint) {
            return Err(DeviceFault::out_of_range("setpoint", setpoint, low, high));
        }
        Ok(Outputs::new().with("readback", setpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Tick;

    #[test]
    fn test_readback_follows_setpoint() {
        let mut device = SetpointDevice::new(SetpointConfig::default()).unwrap();
        let outputs = device
            .update(&Inputs::from_pairs([("setpoint", 4.5)]), &TickContext::new(Tick(1), 1.0))
            .unwrap();
        assert_eq!(outputs.get("readback").and_then(|v| v.as_float()), Some(4.5));
    }

    #[test]
    fn test_out_of_range_setpoint_faults() {
        let config = SetpointConfig {
            low: Some(0.0),
            high: Some(10.0),
            ..SetpointConfig::default()
        };
        let mut device = SetpointDevice::new(config).unwrap();
        let err = device
            .update(&Inputs::from_pairs([("setpoint", 11.0)]), &TickContext::new(Tick(1), 1.0))
            .unwrap_err();
        assert!(err.reason().contains("setpoint"));
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let config = SetpointConfig {
            low: Some(5.0),
            high: Some(1.0),
            ..SetpointConfig::default()
        };
        assert!(SetpointDevice::new(config).is_err());
    }
}
