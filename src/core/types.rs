use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::ConfigurationError;

/// Stable arena index of a device, assigned in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub(crate) usize);

impl DeviceId {
    /// Get the raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Stable arena index of a declared port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub(crate) usize);

impl PortId {
    /// Get the raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// Stable arena index of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Logical simulation timestamp.
///
/// Tick 0 is the construction-time snapshot; the first evaluated tick is 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Get the raw tick number
    pub fn value(self) -> u64 {
        self.0
    }

    /// The tick that follows this one
    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-tick context handed to every device update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// The tick being evaluated
    pub tick: Tick,
    /// Simulated seconds covered by one tick
    pub dt: f64,
}

impl TickContext {
    pub fn new(tick: Tick, dt: f64) -> Self {
        Self { tick, dt }
    }

    /// Simulated time in seconds at the end of this tick
    pub fn time(&self) -> f64 {
        self.tick.0 as f64 * self.dt
    }
}

/// Name-based handle for a port, written as `device.port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRef {
    device: String,
    port: String,
}

impl PortRef {
    /// Create a port handle from its parts
    pub fn new(device: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            port: port.into(),
        }
    }

    /// Parse a `device.port` reference
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        match text.split_once('.') {
            Some((device, port)) if !device.is_empty() && !port.is_empty() => {
                Ok(Self::new(device, port))
            }
            _ => Err(ConfigurationError::MalformedPortRef(text.to_string())),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.port)
    }
}

impl TryFrom<String> for PortRef {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PortRef::parse(&value)
    }
}

impl From<PortRef> for String {
    fn from(value: PortRef) -> Self {
        value.to_string()
    }
}
