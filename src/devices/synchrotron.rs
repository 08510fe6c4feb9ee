//! Storage ring beam current and its top-up countdown.
//!
//! The ring decays from the target current to the minimum over `countdown`
//! seconds, then refills to the target over `fill_time` seconds. The top-up
//! device watches that current and predicts when the next fill starts and
//! ends.
//!
//! The `set_*` inputs are edge triggered: a new value overwrites the device
//! state once, and holding the same value has no further effect.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::core::components::{Device, Inputs, Outputs, PortSpec};
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;
use crate::core::values::ValueType;

/// Configuration of a [`SynchrotronCurrentDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynchrotronCurrentConfig {
    /// Starting beam current in mA; the target current when absent
    pub initial_current: Option<f64>,
    /// Seconds to decay from target to minimum current
    pub countdown: f64,
    /// Seconds to refill from minimum to target current
    pub fill_time: f64,
    pub target_current: f64,
    pub minimum_current: f64,
    /// Standard deviation of gaussian noise added each tick; zero disables it
    pub noise: f64,
    pub seed: u64,
}

impl Default for SynchrotronCurrentConfig {
    fn default() -> Self {
        Self {
            initial_current: None,
            countdown: 600.0,
            fill_time: 15.0,
            target_current: 300.0,
            minimum_current: 270.0,
            noise: 0.0,
            seed: 0,
        }
    }
}

/// Ring current following the top-up saw tooth
#[derive(Debug, Clone)]
pub struct SynchrotronCurrentDevice {
    config: SynchrotronCurrentConfig,
    beam_current: f64,
    topup_fill: bool,
    loss_increment: f64,
    fill_increment: f64,
    noise: Option<(Normal<f64>, StdRng)>,
    last_request: f64,
}

impl SynchrotronCurrentDevice {
    pub const TYPE_TAG: &'static str = "synchrotron_current";

    pub fn new(config: SynchrotronCurrentConfig) -> Result<Self, String> {
        if config.countdown <= 0.0 || config.fill_time <= 0.0 {
            return Err("countdown and fill_time must be positive".to_string());
        }
        if config.minimum_current >= config.target_current {
            return Err(format!(
                "minimum_current {} must be below target_current {}",
                config.minimum_current, config.target_current
            ));
        }

        let noise = if config.noise > 0.0 {
            let normal = Normal::new(0.0, config.noise).map_err(|err| err.to_string())?;
            Some((normal, StdRng::seed_from_u64(config.seed)))
        } else {
            None
        };

        let span = config.target_current - config.minimum_current;
        Ok(Self {
            beam_current: config.initial_current.unwrap_or(config.target_current),
            topup_fill: false,
            loss_increment: -span / config.countdown,
            fill_increment: span / config.fill_time,
            noise,
            last_request: config.initial_current.unwrap_or(config.target_current),
            config,
        })
    }

    pub fn beam_current(&self) -> f64 {
        self.beam_current
    }

    pub fn is_filling(&self) -> bool {
        self.topup_fill
    }
}

impl Device for SynchrotronCurrentDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("set_current", ValueType::Float).with_initial(self.last_request),
            PortSpec::output("current", ValueType::Float).with_initial(self.beam_current),
        ]
    }

    fn update(&mut self, inputs: &Inputs, ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        if let Some(request) = changed_request(inputs, "set_current", &mut self.last_request)? {
            self.beam_current = request;
        }

        // Fill until the target is reached, then decay until the minimum
        self.topup_fill = if self.topup_fill {
            self.beam_current < self.config.target_current
        } else {
            self.beam_current <= self.config.minimum_current
        };

        let rate = if self.topup_fill {
            self.fill_increment
        } else {
            self.loss_increment
        };
        self.beam_current += rate * ctx.dt;

        if let Some((normal, rng)) = self.noise.as_mut() {
            self.beam_current += normal.sample(rng);
        }

        Ok(Outputs::new().with("current", self.beam_current))
    }
}

/// Configuration of a [`TopUpDevice`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopUpConfig {
    /// Seconds until the next fill starts
    pub initial_countdown: f64,
    /// Seconds until the next fill ends
    pub initial_end_countdown: f64,
    /// Current seen before the first tick
    pub last_current: f64,
    pub target_current: f64,
    pub minimum_current: f64,
}

impl Default for TopUpConfig {
    fn default() -> Self {
        Self {
            initial_countdown: 600.0,
            initial_end_countdown: 620.0,
            last_current: 300.0,
            target_current: 300.0,
            minimum_current: 270.0,
        }
    }
}

/// Top-up countdown records derived from the ring current.
///
/// The number of ticks to the next fill boundary is extrapolated from the
/// change of the current since the last tick. A flat current carries no
/// rate information, so the countdowns are held.
#[derive(Debug, Clone)]
pub struct TopUpDevice {
    config: TopUpConfig,
    countdown: f64,
    end_countdown: f64,
    default_fill_time: f64,
    last_current: f64,
    last_countdown_request: f64,
    last_end_request: f64,
}

impl TopUpDevice {
    pub const TYPE_TAG: &'static str = "topup";

    pub fn new(config: TopUpConfig) -> Result<Self, String> {
        if config.initial_end_countdown < config.initial_countdown {
            return Err(format!(
                "initial_end_countdown {} is before initial_countdown {}",
                config.initial_end_countdown, config.initial_countdown
            ));
        }
        Ok(Self {
            countdown: config.initial_countdown,
            end_countdown: config.initial_end_countdown,
            default_fill_time: config.initial_end_countdown - config.initial_countdown,
            last_current: config.last_current,
            last_countdown_request: config.initial_countdown,
            last_end_request: config.initial_end_countdown,
            config,
        })
    }
}

impl Device for TopUpDevice {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("current", ValueType::Float).with_initial(self.config.last_current),
            PortSpec::input("set_countdown", ValueType::Float)
                .with_initial(self.config.initial_countdown),
            PortSpec::input("set_end_countdown", ValueType::Float)
                .with_initial(self.config.initial_end_countdown),
            PortSpec::output("countdown", ValueType::Float)
                .with_initial(self.config.initial_countdown),
            PortSpec::output("end_countdown", ValueType::Float)
                .with_initial(self.config.initial_end_countdown),
        ]
    }

    fn update(&mut self, inputs: &Inputs, ctx: &TickContext) -> Result<Outputs, DeviceFault> {
        let current = inputs.float("current")?;
        let difference = current - self.last_current;
        self.last_current = current;

        if difference != 0.0 {
            let filling = difference > 0.0;
            let ticks_to_go = if filling {
                (self.config.target_current - current) / difference
            } else {
                (current - self.config.minimum_current) / difference
            }
            .abs();

            let (countdown, fill_time) = if filling {
                (0.0, ticks_to_go * ctx.dt)
            } else {
                (ticks_to_go * ctx.dt, self.default_fill_time)
            };
            self.countdown = countdown;
            self.end_countdown = countdown + fill_time;
        }

        if let Some(countdown) =
            changed_request(inputs, "set_countdown", &mut self.last_countdown_request)?
        {
            self.countdown = countdown;
        }
        if let Some(end) = changed_request(inputs, "set_end_countdown", &mut self.last_end_request)? {
            self.end_countdown = end;
        }

        Ok(Outputs::new()
            .with("countdown", self.countdown)
            .with("end_countdown", self.end_countdown))
    }
}

/// The value of a `set_*` input when it differs from the last one seen
fn changed_request(
    inputs: &Inputs,
    port: &str,
    last: &mut f64,
) -> Result<Option<f64>, DeviceFault> {
    if !inputs.has_input(port) {
        return Ok(None);
    }
    let request = inputs.float(port)?;
    if request == *last {
        return Ok(None);
    }
    if !request.is_finite() || request < 0.0 {
        return Err(DeviceFault::out_of_range(port, request, 0.0, f64::MAX));
    }
    *last = request;
    Ok(Some(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Tick;

    fn ctx(tick: u64) -> TickContext {
        TickContext::new(Tick(tick), 1.0)
    }

    fn current_of(outputs: &Outputs) -> f64 {
        outputs.get("current").and_then(|v| v.as_float()).unwrap()
    }

    #[test]
    fn test_current_decays_then_refills() {
        let mut device = SynchrotronCurrentDevice::new(SynchrotronCurrentConfig {
            initial_current: Some(272.0),
            countdown: 30.0,
            fill_time: 10.0,
            ..SynchrotronCurrentConfig::default()
        })
        .unwrap();

        // Loses 1 mA per second down to the minimum
        let outputs = device.update(&Inputs::new(), &ctx(1)).unwrap();
        assert!((current_of(&outputs) - 271.0).abs() < 1e-9);
        device.update(&Inputs::new(), &ctx(2)).unwrap();
        assert!(!device.is_filling());

        // At the minimum the fill starts at 3 mA per second
        let outputs = device.update(&Inputs::new(), &ctx(3)).unwrap();
        assert!(device.is_filling());
        assert!((current_of(&outputs) - 273.0).abs() < 1e-9);
    }

    #[test]
    fn test_fill_stops_at_target() {
        let mut device = SynchrotronCurrentDevice::new(SynchrotronCurrentConfig {
            initial_current: Some(299.0),
            ..SynchrotronCurrentConfig::default()
        })
        .unwrap();
        device.topup_fill = true;

        device.update(&Inputs::new(), &ctx(1)).unwrap();
        assert!(device.beam_current() >= 300.0);
        device.update(&Inputs::new(), &ctx(2)).unwrap();
        assert!(!device.is_filling());
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let config = SynchrotronCurrentConfig {
            noise: 0.5,
            seed: 7,
            ..SynchrotronCurrentConfig::default()
        };
        let mut a = SynchrotronCurrentDevice::new(config.clone()).unwrap();
        let mut b = SynchrotronCurrentDevice::new(config).unwrap();
        for tick in 1..=5 {
            let left = current_of(&a.update(&Inputs::new(), &ctx(tick)).unwrap());
            let right = current_of(&b.update(&Inputs::new(), &ctx(tick)).unwrap());
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_invalid_current_config_rejected() {
        assert!(SynchrotronCurrentDevice::new(SynchrotronCurrentConfig {
            minimum_current: 310.0,
            ..SynchrotronCurrentConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_topup_countdown_while_decaying() {
        let mut device = TopUpDevice::new(TopUpConfig::default()).unwrap();
        // Losing 0.05 mA per tick, 29.95 mA above the minimum
        let outputs = device
            .update(&Inputs::from_pairs([("current", 299.95)]), &ctx(1))
            .unwrap();
        let countdown = outputs.get("countdown").and_then(|v| v.as_float()).unwrap();
        let end = outputs.get("end_countdown").and_then(|v| v.as_float()).unwrap();
        assert!((countdown - 599.0).abs() < 1e-6);
        assert!((end - 619.0).abs() < 1e-6);
    }

    #[test]
    fn test_topup_countdown_while_filling() {
        let mut device = TopUpDevice::new(TopUpConfig {
            last_current: 280.0,
            ..TopUpConfig::default()
        })
        .unwrap();
        // Gaining 2 mA per tick, 18 mA below the target
        let outputs = device
            .update(&Inputs::from_pairs([("current", 282.0)]), &ctx(1))
            .unwrap();
        assert_eq!(outputs.get("countdown").and_then(|v| v.as_float()), Some(0.0));
        let end = outputs.get("end_countdown").and_then(|v| v.as_float()).unwrap();
        assert!((end - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_topup_holds_on_flat_current() {
        let mut device = TopUpDevice::new(TopUpConfig::default()).unwrap();
        let outputs = device
            .update(&Inputs::from_pairs([("current", 300.0)]), &ctx(1))
            .unwrap();
        assert_eq!(outputs.get("countdown").and_then(|v| v.as_float()), Some(600.0));
        assert_eq!(outputs.get("end_countdown").and_then(|v| v.as_float()), Some(620.0));
    }

    #[test]
    fn test_set_current_applies_once() {
        let mut device = SynchrotronCurrentDevice::new(SynchrotronCurrentConfig {
            countdown: 30.0,
            ..SynchrotronCurrentConfig::default()
        })
        .unwrap();

        let request = Inputs::from_pairs([("set_current", 285.0)]);
        let outputs = device.update(&request, &ctx(1)).unwrap();
        assert!((current_of(&outputs) - 284.0).abs() < 1e-9);

        // Same request again keeps decaying from the new state
        let outputs = device.update(&request, &ctx(2)).unwrap();
        assert!((current_of(&outputs) - 283.0).abs() < 1e-9);

        assert!(device
            .update(&Inputs::from_pairs([("set_current", -5.0)]), &ctx(3))
            .is_err());
    }

    #[test]
    fn test_topup_countdown_overrides() {
        let mut device = TopUpDevice::new(TopUpConfig::default()).unwrap();
        let inputs = Inputs::from_pairs([
            ("current", 300.0),
            ("set_countdown", 42.0),
            ("set_end_countdown", 57.0),
        ]);
        let outputs = device.update(&inputs, &ctx(1)).unwrap();
        assert_eq!(outputs.get("countdown").and_then(|v| v.as_float()), Some(42.0));
        assert_eq!(outputs.get("end_countdown").and_then(|v| v.as_float()), Some(57.0));

        // Held overrides do not fight the extrapolation
        let inputs = Inputs::from_pairs([
            ("current", 299.95),
            ("set_countdown", 42.0),
            ("set_end_countdown", 57.0),
        ]);
        let outputs = device.update(&inputs, &ctx(2)).unwrap();
        let countdown = outputs.get("countdown").and_then(|v| v.as_float()).unwrap();
        assert!((countdown - 599.0).abs() < 1e-6);
    }
}
