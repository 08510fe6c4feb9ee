pub mod io;
pub mod port_specs;
pub mod traits;

// Re-export commonly used types
pub use io::{Inputs, Outputs};
pub use port_specs::{PortDirection, PortSpec};
pub use traits::Device;
