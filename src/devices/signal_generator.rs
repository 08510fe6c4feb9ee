use std::f64::consts::TAU;

use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;

/// Initial wave settings of a [`SignalGeneratorDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaveSettings {
    pub amplitude: f64,
    /// Hz
    pub frequency: f64,
    pub offset: f64,
    /// The gate is open while the value is above this level
    pub threshold: f64,
    pub enabled: bool,
}

impl Default for WaveSettings {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            frequency: 1.0,
            offset: 1.0,
            threshold: 0.5,
            enabled: true,
        }
    }
}

/// Sine wave source with a threshold gate.
///
/// The wave is evaluated at the simulated time of the tick, so its shape
/// depends on `tick_seconds`. A disabled generator outputs zero.
#[derive(Debug, Clone)]
pub struct SignalGeneratorDevice {
    settings: WaveSettings,
}

impl SignalGeneratorDevice {
    pub const TYPE_TAG: &'static str = "signal_generator";

    pub fn new(settings: WaveSettings) -> Result<Self, String> {
        if settings.frequency < 0.0 {
            return Err(format!("frequency must not be negative, got {}", settings.frequency));
        }
        Ok(Self { settings })
    }

    fn sample(settings: &WaveSettings, time: f64) -> f64 {
        if settings.enabled {
            settings.offset + settings.amplitude * (TAU * settings.frequency * time).sin()
        } else {
            0.0
        }
    }
}

impl Device for SignalGeneratorDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        let settings = &self.settings;
        let value = Self::sample(settings, 0.0);
        vec![
            PortSpec::input("amplitude", ValueType::Float).with_initial(settings.amplitude),
            PortSpec::input("frequency", ValueType::Float).with_initial(settings.frequency),
            PortSpec::input("offset", ValueType::Float).with_initial(settings.offset),
            PortSpec::input("threshold", ValueType::Float).with_initial(settings.threshold),
            PortSpec::input("enabled", ValueType::Bool).with_initial(settings.enabled),
            PortSpec::output("value", ValueType::Float).with_initial(value),
            PortSpec::output("gate", ValueType::Bool).with_initial(value > settings.threshold),
        ]
    }

    fn update(&mut self, inputs: &Inputs, ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let frequency = inputs.float("frequency")?;
        if frequency < 0.0 {
            return Err(DeviceFault::new(format!(
                "frequency must not be negative, got {}",
                frequency
            )));
        }

        self.settings = WaveSettings {
            amplitude: inputs.float("amplitude")?,
            frequency,
            offset: inputs.float("offset")?,
            threshold: inputs.float("threshold")?,
            enabled: inputs.bool("enabled")?,
        };

        let value = Self::sample(&self.settings, ctx.time());
        Ok(Outputs::new()
            .with("value", value)
            .with("gate", value > self.settings.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Tick;
    use crate::core::values::Value;

    fn inputs(settings: &WaveSettings) -> Inputs {
        Inputs::from_pairs([
            ("amplitude", Value::Float(settings.amplitude)),
            ("frequency", Value::Float(settings.frequency)),
            ("offset", Value::Float(settings.offset)),
            ("threshold", Value::Float(settings.threshold)),
            ("enabled", Value::Bool(settings.enabled)),
        ])
    }

    fn run(settings: WaveSettings) -> Vec<(f64, bool)> {
        let inputs = inputs(&settings);
        let mut device = SignalGeneratorDevice::new(settings).unwrap();
        (0..6)
            .map(|tick| {
                let outputs = device
                    .update(&inputs, &TickContext::new(Tick(tick), 0.25))
                    .unwrap();
                (
                    outputs.get("value").and_then(|v| v.as_float()).unwrap(),
                    outputs.get("gate").and_then(|v| v.as_bool()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_produces_sine_wave() {
        let expected = [1.0, 2.0, 1.0, 0.0, 1.0, 2.0];
        for ((value, _), expected) in run(WaveSettings::default()).into_iter().zip(expected) {
            assert!((value - expected).abs() < 1e-9, "{} != {}", value, expected);
        }
    }

    #[test]
    fn test_gate_follows_threshold() {
        let gates: Vec<bool> = run(WaveSettings::default()).into_iter().map(|(_, g)| g).collect();
        assert_eq!(gates, vec![true, true, true, false, true, true]);
    }

    #[test]
    fn test_disabled_outputs_zero() {
        let values: Vec<f64> = run(WaveSettings {
            enabled: false,
            ..WaveSettings::default()
        })
        .into_iter()
        .map(|(v, _)| v)
        .collect();
        assert_eq!(values, vec![0.0; 6]);
    }

    #[test]
    fn test_negative_frequency_faults() {
        let mut device = SignalGeneratorDevice::new(WaveSettings::default()).unwrap();
        let settings = WaveSettings {
            frequency: -1.0,
            ..WaveSettings::default()
        };
        assert!(device
            .update(&inputs(&settings), &TickContext::new(Tick(1), 1.0))
            .is_err());
    }
}
