pub mod assembly;
pub mod description;

pub use assembly::{AssemblyBuilder, SimulationAssembly};
pub use description::{
    Description, DeviceDescription, LinkDescription, SchedulerSection, VariableDescription,
};
