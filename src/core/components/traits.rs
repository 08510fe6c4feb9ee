use crate::core::components::io::{Inputs, Outputs};
use crate::core::components::port_specs::PortSpec;
use crate::core::errors::DeviceFault;
use crate::core::types::TickContext;

/// Update contract shared by every simulated device.
///
/// A device owns its private state and touches nothing else: `update` reads
/// the input snapshot and the tick context, advances the private state and
/// returns the new output values. The scheduler dispatches through
/// `Box<dyn Device>`, so one flat trait covers every device type.
pub trait Device: Send {
    /// Type tag used in descriptions, e.g. `"motor"`
    fn type_tag(&self) -> &'static str;

    /// Declare the device's ports.
    ///
    /// Called once at assembly time; the returned set must not change for
    /// the lifetime of the device.
    fn ports(&self) -> Vec<PortSpec>;

    /// Advance one tick.
    ///
    /// Returning `Err` rejects the inputs for this tick: the scheduler keeps
    /// the previous outputs and records a fault against this device. Its
    /// input ports also keep their previous settled values, so a rejected PV
    /// write is discarded rather than offered again on the next tick.
    fn update(&mut self, inputs: &Inputs, ctx: &TickContext) -> Result<Outputs, DeviceFault>;
}
