//! Error taxonomy of the simulation engine.
//!
//! Configuration problems are fatal to startup, device faults are isolated to
//! the tick and device that raised them, and PV errors go back to the caller
//! without touching scheduler state.

use serde::Serialize;
use thiserror::Error;

use crate::core::components::port_specs::PortDirection;
use crate::core::types::Tick;
use crate::core::values::ValueType;

/// Bad port, link, binding or device declarations detected at assembly time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("device '{0}' is declared more than once")]
    DuplicateDevice(String),

    #[error("invalid device name '{0}': names must be non-empty and contain no '.'")]
    InvalidDeviceName(String),

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("unknown device type '{type_tag}' for device '{device}'")]
    UnknownDeviceType { device: String, type_tag: String },

    #[error("port '{port}' is declared more than once on device '{device}'")]
    DuplicatePort { device: String, port: String },

    #[error("device '{device}' has no port named '{port}'")]
    UnknownPort { device: String, port: String },

    #[error("port '{device}.{port}' is an {actual} port, expected an {expected} port")]
    DirectionMismatch {
        device: String,
        port: String,
        expected: PortDirection,
        actual: PortDirection,
    },

    #[error("cannot link {source_port} ({source_type}) to {target_port} ({target_type})")]
    TypeMismatch {
        source_port: String,
        source_type: ValueType,
        target_port: String,
        target_type: ValueType,
    },

    #[error("initial value of '{device}.{port}' is {actual}, expected {expected}")]
    InitialValueType {
        device: String,
        port: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("input port {port} is already driven by {existing}")]
    InputAlreadyLinked { port: String, existing: String },

    #[error("cyclic topology without a delayed link among devices {devices:?}")]
    CyclicTopology { devices: Vec<String> },

    #[error("process variable '{0}' is bound more than once")]
    DuplicateVariable(String),

    #[error("invalid configuration for device '{device}': {reason}")]
    InvalidDeviceConfig { device: String, reason: String },

    #[error("malformed port reference '{0}', expected 'device.port'")]
    MalformedPortRef(String),

    #[error("scheduler was given {devices} devices for {declared} declared devices")]
    DeviceCountMismatch { devices: usize, declared: usize },

    #[error("failed to build evaluation thread pool: {0}")]
    ThreadPool(String),

    #[error("tick length must be a positive finite number of seconds, got {0}")]
    InvalidTickLength(f64),
}

/// Raised by a device that rejects its inputs for one tick
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct DeviceFault {
    reason: String,
}

impl DeviceFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Fault for a numeric input outside its declared domain
    pub fn out_of_range(port: &str, value: f64, low: f64, high: f64) -> Self {
        Self::new(format!(
            "input '{}' = {} is outside [{}, {}]",
            port, value, low, high
        ))
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A device fault attributed to the device and tick that produced it
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("device '{device}' faulted on tick {tick}: {reason}")]
pub struct SimulationFault {
    pub device: String,
    pub tick: Tick,
    pub reason: String,
}

/// Errors returned synchronously to a process-variable operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PvError {
    #[error("unknown process variable '{0}'")]
    UnknownVariable(String),

    #[error("process variable '{0}' is read-only")]
    ReadOnlyVariable(String),

    #[error("process variable '{pv}' expects {expected}, got {actual}")]
    TypeMismatch {
        pv: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("simulation halted")]
    SimulationHalted,
}

/// Top-level error of assembly construction and run control
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Pv(#[from] PvError),

    #[error("fatal fault halted the simulation: {0}")]
    FatalFault(SimulationFault),

    #[error("simulation halted; no further ticks are accepted")]
    Halted,

    #[error("the run loop is already running")]
    AlreadyRunning,

    #[error("failed to read description: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse description: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
