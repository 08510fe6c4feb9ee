use std::collections::HashMap;

use crate::core::errors::DeviceFault;
use crate::core::values::Value;

/// Input snapshot handed to a device update.
///
/// Holds one settled value per declared input port: an external override
/// staged for this tick, the value propagated from the upstream device, or
/// the previous tick's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    values: HashMap<String, Value>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from `(port, value)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub(crate) fn insert(&mut self, port: &str, value: Value) {
        self.values.insert(port.to_string(), value);
    }

    /// Get the raw value of an input port
    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    /// Get a float input; ints are widened
    pub fn float(&self, port: &str) -> Result<f64, DeviceFault> {
        self.require(port)?
            .as_float()
            .ok_or_else(|| DeviceFault::new(format!("input '{}' is not numeric", port)))
    }

    pub fn int(&self, port: &str) -> Result<i64, DeviceFault> {
        self.require(port)?
            .as_int()
            .ok_or_else(|| DeviceFault::new(format!("input '{}' is not an int", port)))
    }

    pub fn bool(&self, port: &str) -> Result<bool, DeviceFault> {
        self.require(port)?
            .as_bool()
            .ok_or_else(|| DeviceFault::new(format!("input '{}' is not a bool", port)))
    }

    pub fn text(&self, port: &str) -> Result<&str, DeviceFault> {
        self.require(port)?
            .as_text()
            .ok_or_else(|| DeviceFault::new(format!("input '{}' is not text", port)))
    }

    /// Check if input port exists
    pub fn has_input(&self, port: &str) -> bool {
        self.values.contains_key(port)
    }

    /// Get all available input port names
    pub fn input_ports(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, port: &str) -> Result<&Value, DeviceFault> {
        self.values
            .get(port)
            .ok_or_else(|| DeviceFault::new(format!("missing input '{}'", port)))
    }
}

/// Output values computed by one device update.
///
/// Ports left unset keep their previous settled value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: Vec<(String, Value)>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an output value, replacing an earlier value for the same port
    pub fn set(&mut self, port: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| name == port) {
            Some(slot) => slot.1 = value,
            None => self.values.push((port.to_string(), value)),
        }
        self
    }

    /// Builder form of [`Outputs::set`]
    pub fn with(mut self, port: &str, value: impl Into<Value>) -> Self {
        self.set(port, value);
        self
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == port)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn into_values(self) -> Vec<(String, Value)> {
        self.values
    }
}
