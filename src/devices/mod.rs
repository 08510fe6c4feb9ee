//! Compiled catalog of simulated beamline devices.

pub mod amplifier;
pub mod current_source;
pub mod motion;
pub mod motor;
pub mod pneumatic;
pub mod setpoint;
pub mod signal_generator;
pub mod synchrotron;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::core::components::Device;
use crate::core::errors::ConfigurationError;

pub use amplifier::{AmplifierConfig, AmplifierDevice};
pub use current_source::{CurrentSourceConfig, CurrentSourceDevice};
pub use motion::Motion;
pub use motor::{MotorConfig, MotorDevice};
pub use pneumatic::{PneumaticConfig, PneumaticDevice};
pub use setpoint::{SetpointConfig, SetpointDevice};
pub use signal_generator::{SignalGeneratorDevice, WaveSettings};
pub use synchrotron::{
    SynchrotronCurrentConfig, SynchrotronCurrentDevice, TopUpConfig, TopUpDevice,
};

/// Builds a device from its description `config` block
pub type DeviceConstructor =
    Box<dyn Fn(&serde_yaml::Value) -> Result<Box<dyn Device>, String> + Send + Sync>;

/// Registry of device constructors keyed by type tag
pub struct DeviceCatalog {
    constructors: BTreeMap<String, DeviceConstructor>,
}

impl DeviceCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Catalog with every built-in device type
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(SetpointDevice::TYPE_TAG, |config| {
            SetpointDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(AmplifierDevice::TYPE_TAG, |config| {
            AmplifierDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(MotorDevice::TYPE_TAG, |config| {
            MotorDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(PneumaticDevice::TYPE_TAG, |config| {
            PneumaticDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(SynchrotronCurrentDevice::TYPE_TAG, |config| {
            SynchrotronCurrentDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(TopUpDevice::TYPE_TAG, |config| {
            TopUpDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(SignalGeneratorDevice::TYPE_TAG, |config| {
            SignalGeneratorDevice::new(parse_config(config)?).map(boxed)
        });
        catalog.register(CurrentSourceDevice::TYPE_TAG, |config| {
            CurrentSourceDevice::new(parse_config(config)?).map(boxed)
        });
        catalog
    }

    /// Register a constructor, replacing any earlier one for `type_tag`
    pub fn register<F>(&mut self, type_tag: &str, constructor: F)
    where
        F: Fn(&serde_yaml::Value) -> Result<Box<dyn Device>, String> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_tag.to_string(), Box::new(constructor));
    }

    /// Construct the device `name` of type `type_tag`
    pub fn create(
        &self,
        name: &str,
        type_tag: &str,
        config: &serde_yaml::Value,
    ) -> Result<Box<dyn Device>, ConfigurationError> {
        let constructor =
            self.constructors
                .get(type_tag)
                .ok_or_else(|| ConfigurationError::UnknownDeviceType {
                    device: name.to_string(),
                    type_tag: type_tag.to_string(),
                })?;
        constructor(config).map_err(|reason| ConfigurationError::InvalidDeviceConfig {
            device: name.to_string(),
            reason,
        })
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Registered type tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Deserialize a device config block; an absent block yields the defaults
pub fn parse_config<T>(config: &serde_yaml::Value) -> Result<T, String>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(config.clone()).map_err(|err| err.to_string())
}

fn boxed<D: Device + 'static>(device: D) -> Box<dyn Device> {
    Box::new(device)
}
