use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;

/// Configuration of an [`AmplifierDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmplifierConfig {
    pub initial_gain: f64,
    pub initial_current: f64,
    /// Largest gain the amplifier accepts
    pub max_gain: f64,
}

impl Default for AmplifierConfig {
    fn default() -> Self {
        Self {
            initial_gain: 2.5,
            initial_current: 0.0,
            max_gain: 1e10,
        }
    }
}

/// Current amplifier scaling its input signal by a settable gain.
///
/// `current = input * gain`; `gain_rbv` reads back the gain in use.
#[derive(Debug, Clone)]
pub struct AmplifierDevice {
    config: AmplifierConfig,
}

impl AmplifierDevice {
    pub const TYPE_TAG: &'static str = "amplifier";

    pub fn new(config: AmplifierConfig) -> Result<Self, String> {
        if config.max_gain <= 0.0 {
            return Err(format!("max_gain must be positive, got {}", config.max_gain));
        }
        if config.initial_gain <= 0.0 || config.initial_gain > config.max_gain {
            return Err(format!(
                "initial_gain {} is outside (0, {}]",
                config.initial_gain, config.max_gain
            ));
        }
        Ok(Self { config })
    }
}

impl Device for AmplifierDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        let AmplifierConfig {
            initial_gain,
            initial_current,
            ..
        } = self.config;
        vec![
            PortSpec::input("input", ValueType::Float).with_initial(initial_current),
            PortSpec::input("gain", ValueType::Float).with_initial(initial_gain),
            PortSpec::output("current", ValueType::Float).with_initial(initial_current * initial_gain),
            PortSpec::output("gain_rbv", ValueType::Float).with_initial(initial_gain),
        ]
    }

    fn update(&mut self, inputs: &Inputs, _ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let gain = inputs.float("gain")?;
        if gain <= 0.0 || gain > self.config.max_gain {
            return Err(DeviceFault::new(format!(
                "gain {} is outside (0, {}]",
                gain, self.config.max_gain
            )));
        }

        let input = inputs.float("input")?;
        Ok(Outputs::new()
            .with("current", input * gain)
            .with("gain_rbv", gain))
    }
}
