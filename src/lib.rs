pub mod core;
pub mod devices;

// Re-export commonly used types
pub use crate::core::builder::{AssemblyBuilder, Description, SimulationAssembly};
pub use crate::core::components::{Device, Inputs, Outputs, PortDirection, PortSpec};
pub use crate::core::errors::{ConfigurationError, DeviceFault, PvError, SimError, SimulationFault};
pub use crate::core::execution::{
    ConcurrencyMode, FaultPolicy, Pacing, SchedulerConfig, SchedulerState, SnapshotView,
};
pub use crate::core::types::{DeviceId, PortId, PortRef, Tick, TickContext};
pub use crate::core::values::{Value, ValueType};
pub use crate::core::variables::{Subscription, ValueChange, VariableAdapter, VariableInfo};
pub use crate::devices::DeviceCatalog;
