//! Static YAML description of a simulation assembly.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::components::port_specs::PortDirection;
use crate::core::errors::SimError;
use crate::core::execution::config::{ConcurrencyMode, FaultPolicy, Pacing, SchedulerConfig};
use crate::core::types::PortRef;

/// Devices, links, PV bindings and scheduler settings of one assembly
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Description {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub devices: Vec<DeviceDescription>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub variables: Vec<VariableDescription>,
}

impl Description {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SimError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Any fault of this device halts the simulation
    #[serde(default)]
    pub fatal: bool,
    /// Device-type specific settings
    #[serde(default)]
    pub config: serde_yaml::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDescription {
    pub from: PortRef,
    pub to: PortRef,
    #[serde(default)]
    pub delayed: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDescription {
    pub pv: String,
    pub device: String,
    pub field: String,
    /// Checked against the port when present
    #[serde(default)]
    pub direction: Option<PortDirection>,
}

/// Scheduler settings; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub tick_seconds: Option<f64>,
    pub concurrency: ConcurrencyMode,
    pub threads: Option<usize>,
    pub period_ms: Option<u64>,
    pub fault_policy: FaultPolicy,
    pub fault_log_capacity: Option<usize>,
    pub subscription_buffer: Option<usize>,
}

impl SchedulerSection {
    /// Overlay the section on the default scheduler configuration
    pub fn to_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::new()
            .with_concurrency(self.concurrency)
            .with_fault_policy(self.fault_policy);
        if let Some(seconds) = self.tick_seconds {
            config = config.with_tick_seconds(seconds);
        }
        if let Some(threads) = self.threads {
            config = config.with_thread_pool_size(threads);
        }
        if let Some(period) = self.period_ms {
            config = config.with_pacing(Pacing::Period(Duration::from_millis(period)));
        }
        if let Some(capacity) = self.fault_log_capacity {
            config = config.with_fault_log_capacity(capacity);
        }
        if let Some(capacity) = self.subscription_buffer {
            config = config.with_subscription_buffer(capacity);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEAMLINE: &str = r#"
scheduler:
  tick_seconds: 0.5
  concurrency: rayon
  threads: 2
  period_ms: 100
devices:
  - name: ring
    type: synchrotron_current
    config:
      initial_current: 290.0
  - name: topup
    type: topup
    fatal: true
links:
  - from: ring.current
    to: topup.current
variables:
  - pv: SR-DI-DCCT-01:SIGNAL
    device: ring
    field: current
    direction: output
"#;

    #[test]
    fn test_parse_full_description() {
        let description = Description::from_yaml_str(BEAMLINE).unwrap();
        assert_eq!(description.devices.len(), 2);
        assert_eq!(description.devices[0].type_tag, "synchrotron_current");
        assert!(description.devices[1].fatal);
        assert!(description.devices[1].config.is_null());
        assert_eq!(description.links[0].from, PortRef::new("ring", "current"));
        assert!(!description.links[0].delayed);
        assert_eq!(description.variables[0].direction, Some(PortDirection::Output));

        let config = description.scheduler.to_config();
        assert_eq!(config.tick_seconds, 0.5);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
        assert_eq!(config.thread_pool_size, Some(2));
        assert_eq!(config.pacing, Pacing::Period(Duration::from_millis(100)));
    }

    #[test]
    fn test_empty_description_uses_defaults() {
        let description = Description::from_yaml_str("devices: []").unwrap();
        assert_eq!(description.scheduler.to_config(), SchedulerConfig::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            Description::from_yaml_str("devices: []\nextra: 1"),
            Err(SimError::Yaml(_))
        ));
        assert!(matches!(
            Description::from_yaml_str("scheduler:\n  tick: 1\n"),
            Err(SimError::Yaml(_))
        ));
    }

    #[test]
    fn test_malformed_port_reference_rejected() {
        let yaml = "links:\n  - from: ring\n    to: topup.current\n";
        assert!(matches!(Description::from_yaml_str(yaml), Err(SimError::Yaml(_))));
    }
}
