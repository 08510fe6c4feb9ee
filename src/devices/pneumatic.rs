use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;
use crate::devices::motion::Motion;

const RETRACTED: f64 = 0.0;
const INSERTED: f64 = 1.0;

/// Configuration of a [`PneumaticDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PneumaticConfig {
    /// Seconds for a full stroke in either direction
    pub initial_speed: f64,
    /// Start inserted
    pub initial_state: bool,
}

impl Default for PneumaticConfig {
    fn default() -> Self {
        Self {
            initial_speed: 2.5,
            initial_state: false,
        }
    }
}

/// Two-state pneumatic actuator, e.g. a filter or a screen.
///
/// A stroke takes `initial_speed` seconds; `inserted` only reports true once
/// the actuator is fully in.
#[derive(Debug, Clone)]
pub struct PneumaticDevice {
    config: PneumaticConfig,
    motion: Motion,
}

impl PneumaticDevice {
    pub const TYPE_TAG: &'static str = "pneumatic";

    pub fn new(config: PneumaticConfig) -> Result<Self, String> {
        if config.initial_speed <= 0.0 {
            return Err(format!(
                "initial_speed must be positive, got {}",
                config.initial_speed
            ));
        }
        let start = if config.initial_state { INSERTED } else { RETRACTED };
        let motion = Motion::new(start, (INSERTED - RETRACTED) / config.initial_speed);
        Ok(Self { config, motion })
    }
}

impl Device for PneumaticDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("demand", ValueType::Bool).with_initial(self.config.initial_state),
            PortSpec::output("inserted", ValueType::Bool).with_initial(self.config.initial_state),
            PortSpec::output("moving", ValueType::Bool),
        ]
    }

    fn update(&mut self, inputs: &Inputs, ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let target = if inputs.bool("demand")? { INSERTED } else { RETRACTED };
        self.motion.set_target(target);
        let position = self.motion.advance(ctx.dt);

        Ok(Outputs::new()
            .with("inserted", position >= INSERTED)
            .with("moving", self.motion.is_moving()))
    }
}
