use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;
use crate::devices::motion::Motion;

/// Configuration of a [`MotorDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotorConfig {
    pub initial_position: f64,
    /// Units per simulated second
    pub velocity: f64,
    pub low_limit: f64,
    pub high_limit: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            initial_position: 0.0,
            velocity: 1.0,
            low_limit: -100.0,
            high_limit: 100.0,
        }
    }
}

/// Single-axis motor moving towards its demand at a fixed velocity
#[derive(Debug, Clone)]
pub struct MotorDevice {
    config: MotorConfig,
    motion: Motion,
}

impl MotorDevice {
    pub const TYPE_TAG: &'static str = "motor";

    pub fn new(config: MotorConfig) -> Result<Self, String> {
        if config.velocity <= 0.0 {
            return Err(format!("velocity must be positive, got {}", config.velocity));
        }
        if config.low_limit > config.high_limit {
            return Err(format!(
                "low_limit {} is above high_limit {}",
                config.low_limit, config.high_limit
            ));
        }
        if !(config.low_limit..=config.high_limit).contains(&config.initial_position) {
            return Err(format!(
                "initial_position {} is outside the limits",
                config.initial_position
            ));
        }

        let motion = Motion::new(config.initial_position, config.velocity);
        Ok(Self { config, motion })
    }

    pub fn motion(&self) -> &Motion {
        &self.motion
    }
}

impl Device for MotorDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("demand", ValueType::Float).with_initial(self.config.initial_position),
            PortSpec::output("position", ValueType::Float)
                .with_initial(self.config.initial_position),
            PortSpec::output("moving", ValueType::Bool),
        ]
    }

    fn update(&mut self, inputs: &Inputs, ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let demand = inputs.float("demand")?;
        let MotorConfig {
            low_limit,
            high_limit,
            ..
        } = self.config;
        if !(low_limit..=high_limit).contains(&demand) {
            return Err(DeviceFault::out_of_range("demand", demand, low_limit, high_limit));
        }

        self.motion.set_target(demand);
        let position = self.motion.advance(ctx.dt);
        Ok(Outputs::new()
            .with("position", position)
            .with("moving", self.motion.is_moving()))
    }
}
