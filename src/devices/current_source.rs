use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;

/// Configuration of a [`CurrentSourceDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurrentSourceConfig {
    pub low: f64,
    pub high: f64,
    pub seed: u64,
}

impl Default for CurrentSourceConfig {
    fn default() -> Self {
        Self {
            low: 100.0,
            high: 200.0,
            seed: 0,
        }
    }
}

/// Noisy current source drawing a uniform sample every tick
#[derive(Debug, Clone)]
pub struct CurrentSourceDevice {
    config: CurrentSourceConfig,
    distribution: Uniform<f64>,
    rng: StdRng,
}

impl CurrentSourceDevice {
    pub const TYPE_TAG: &'static str = "current_source";

    pub fn new(config: CurrentSourceConfig) -> Result<Self, String> {
        if !(config.high - config.low).is_finite() {
            return Err(format!(
                "bounds {}..{} must be finite",
                config.low, config.high
            ));
        }
        if !(config.low < config.high) {
            return Err(format!(
                "low {} must be below high {}",
                config.low, config.high
            ));
        }
        Ok(Self {
            distribution: Uniform::new(config.low, config.high),
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }
}

impl Device for CurrentSourceDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("output", ValueType::Float).with_initial(self.config.low)]
    }

    fn update(&mut self, _inputs: &Inputs, _ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let output = self.distribution.sample(&mut self.rng);
        Ok(Outputs::new().with("output", output))
    }
}
