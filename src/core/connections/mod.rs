pub mod port_validator;
pub mod registry;

pub use port_validator::PortValidator;
pub use registry::{DeviceEntry, Link, LinkRegistry, Port, RegistryStats};
