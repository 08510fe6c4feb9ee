use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::core::builder::description::Description;
use crate::core::components::port_specs::PortDirection;
use crate::core::components::traits::Device;
use crate::core::connections::registry::LinkRegistry;
use crate::core::errors::{ConfigurationError, SimError, SimulationFault};
use crate::core::execution::config::{Pacing, SchedulerConfig};
use crate::core::execution::execution_order::EvaluationOrder;
use crate::core::execution::scheduler::{
    Scheduler, SchedulerHandle, SchedulerState, SchedulerStats, TickReport,
};
use crate::core::execution::snapshot::SnapshotView;
use crate::core::types::{DeviceId, LinkId, PortRef, Tick};
use crate::core::variables::adapter::{Binding, VariableAdapter};
use crate::core::variables::subscription::SubscriptionHub;
use crate::devices::DeviceCatalog;

/// Imperative API for composing a simulation assembly.
///
/// Declarations are validated as they are added; the evaluation order is
/// only computed by [`AssemblyBuilder::build`].
pub struct AssemblyBuilder {
    registry: LinkRegistry,
    devices: Vec<Box<dyn Device>>,
    fatal: Vec<DeviceId>,
    bindings: Vec<Binding>,
    config: SchedulerConfig,
}

impl AssemblyBuilder {
    pub fn new() -> Self {
        Self {
            registry: LinkRegistry::new(),
            devices: Vec::new(),
            fatal: Vec::new(),
            bindings: Vec::new(),
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a device and declare its ports
    pub fn add_device(
        &mut self,
        name: &str,
        device: Box<dyn Device>,
    ) -> Result<DeviceId, ConfigurationError> {
        let specs = device.ports();
        let mut seen = HashSet::new();
        if let Some(spec) = specs.iter().find(|spec| !seen.insert(spec.name.as_str())) {
            return Err(ConfigurationError::DuplicatePort {
                device: name.to_string(),
                port: spec.name.clone(),
            });
        }

        let id = self.registry.add_device(name, device.type_tag())?;
        for spec in &specs {
            self.registry.declare_spec(id, spec)?;
        }
        self.devices.push(device);
        Ok(id)
    }

    /// Escalate every fault of `device` to a halt
    pub fn set_fatal(&mut self, device: &str) -> Result<(), ConfigurationError> {
        let id = self
            .registry
            .device_id(device)
            .ok_or_else(|| ConfigurationError::UnknownDevice(device.to_string()))?;
        if !self.fatal.contains(&id) {
            self.fatal.push(id);
        }
        Ok(())
    }

    /// Link `device.port` references, e.g. `connect("ring.current", "topup.current", false)`
    pub fn connect(&mut self, from: &str, to: &str, delayed: bool) -> Result<LinkId, ConfigurationError> {
        self.connect_refs(&PortRef::parse(from)?, &PortRef::parse(to)?, delayed)
    }

    pub fn connect_refs(
        &mut self,
        from: &PortRef,
        to: &PortRef,
        delayed: bool,
    ) -> Result<LinkId, ConfigurationError> {
        self.registry.connect_refs(from, to, delayed)
    }

    /// Bind a PV name to a device port
    pub fn bind(
        &mut self,
        pv: &str,
        device: &str,
        field: &str,
        direction: Option<PortDirection>,
    ) -> Result<(), ConfigurationError> {
        if self.bindings.iter().any(|binding| binding.pv == pv) {
            return Err(ConfigurationError::DuplicateVariable(pv.to_string()));
        }
        let binding = Binding::resolve(&self.registry, pv, device, field, direction)?;
        self.bindings.push(binding);
        Ok(())
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    /// Validate the topology and wire scheduler, adapter and subscriptions
    pub fn build(self) -> Result<SimulationAssembly, ConfigurationError> {
        let registry = Arc::new(self.registry);
        let mut scheduler = Scheduler::new(registry.clone(), self.devices, self.config.clone())?;
        for device in self.fatal {
            scheduler.set_fatal(device, true);
        }

        let hub = Arc::new(SubscriptionHub::new(self.config.subscription_buffer));
        scheduler.add_observer(hub.clone());

        let handle = scheduler.handle();
        let variables = VariableAdapter::new(registry.clone(), handle.clone(), hub.clone());
        for binding in self.bindings {
            variables.insert(binding)?;
        }

        let stats = registry.stats();
        info!(
            "assembly built: {} devices, {} ports, {} links ({} delayed), {} PVs",
            stats.devices,
            stats.ports,
            stats.links,
            stats.delayed_links,
            variables.names().len()
        );

        Ok(SimulationAssembly {
            scheduler: Arc::new(Mutex::new(scheduler)),
            handle,
            registry,
            variables,
            hub,
            pacing: self.config.pacing,
            run_loop: None,
        })
    }
}

impl Default for AssemblyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Background tick driver
struct RunLoop {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<Result<(), SimError>>,
}

/// A constructed simulation: devices, links, PV bindings and the scheduler.
///
/// Ticks are driven either manually with [`SimulationAssembly::step`] or by
/// the background loop started with [`SimulationAssembly::start`]; both
/// serialize on the scheduler. Dropping the assembly stops the loop and
/// closes every subscription.
pub struct SimulationAssembly {
    scheduler: Arc<Mutex<Scheduler>>,
    handle: SchedulerHandle,
    registry: Arc<LinkRegistry>,
    variables: VariableAdapter,
    hub: Arc<SubscriptionHub>,
    pacing: Pacing,
    run_loop: Option<RunLoop>,
}

impl SimulationAssembly {
    /// Build an assembly from a parsed description
    pub fn from_description(
        description: &Description,
        catalog: &DeviceCatalog,
    ) -> Result<Self, SimError> {
        let mut builder = AssemblyBuilder::new().with_config(description.scheduler.to_config());

        for device in &description.devices {
            let instance = catalog.create(&device.name, &device.type_tag, &device.config)?;
            builder.add_device(&device.name, instance)?;
            if device.fatal {
                builder.set_fatal(&device.name)?;
            }
        }
        for link in &description.links {
            builder.connect_refs(&link.from, &link.to, link.delayed)?;
        }
        for variable in &description.variables {
            builder.bind(&variable.pv, &variable.device, &variable.field, variable.direction)?;
        }

        Ok(builder.build()?)
    }

    /// Parse and build a YAML description using the built-in device catalog
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SimError> {
        Self::from_description(&Description::from_yaml_str(yaml)?, &DeviceCatalog::builtin())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        Self::from_description(&Description::from_yaml_file(path)?, &DeviceCatalog::builtin())
    }

    /// Run exactly one tick
    pub fn step(&self) -> Result<TickReport, SimError> {
        self.scheduler.lock().tick()
    }

    /// Run `ticks` ticks, returning the last completed tick
    pub fn run_for(&self, ticks: u64) -> Result<Tick, SimError> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(self.current_tick())
    }

    /// Start the background tick loop
    pub fn start(&mut self) -> Result<(), SimError> {
        if self.run_loop.is_some() {
            return Err(SimError::AlreadyRunning);
        }
        if self.handle.is_halted() {
            return Err(SimError::Halted);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let scheduler = self.scheduler.clone();
        let pacing = self.pacing;
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("s03-tick-driver".to_string())
            .spawn(move || drive(scheduler, pacing, thread_stop))?;

        info!("run loop started ({:?})", pacing);
        self.run_loop = Some(RunLoop { stop, thread });
        Ok(())
    }

    /// Stop the background loop after its in-flight tick.
    ///
    /// Returns the error that ended the loop early, if any.
    pub fn stop(&mut self) -> Result<(), SimError> {
        let Some(run_loop) = self.run_loop.take() else {
            return Ok(());
        };
        run_loop.stop.store(true, Ordering::Release);
        run_loop.thread.thread().unpark();

        let result = match run_loop.thread.join() {
            Ok(result) => result,
            Err(_) => {
                error!("run loop thread panicked");
                Ok(())
            }
        };
        info!("run loop stopped at tick {}", self.current_tick());
        result
    }

    pub fn is_running(&self) -> bool {
        self.run_loop
            .as_ref()
            .map_or(false, |run_loop| !run_loop.thread.is_finished())
    }

    /// Stop the loop and close every subscription
    pub fn shutdown(mut self) -> Result<(), SimError> {
        let result = self.stop();
        self.hub.close_all();
        info!("simulation shut down at tick {}", self.current_tick());
        result
    }

    pub fn current_tick(&self) -> Tick {
        self.handle.current_tick()
    }

    pub fn state(&self) -> SchedulerState {
        self.handle.state()
    }

    /// Most recent faults, oldest first
    pub fn faults(&self) -> Vec<SimulationFault> {
        self.handle.faults()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.handle.stats()
    }

    /// Name-keyed copy of the last settled tick
    pub fn snapshot(&self) -> SnapshotView {
        self.handle.settled().view(&self.registry)
    }

    /// PV surface handle, cheap to clone
    pub fn variables(&self) -> VariableAdapter {
        self.variables.clone()
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn evaluation_order(&self) -> EvaluationOrder {
        self.scheduler.lock().order().clone()
    }
}

impl Drop for SimulationAssembly {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("run loop ended with error: {}", err);
        }
        self.hub.close_all();
    }
}

/// Tick until stopped or halted, sleeping out the remainder of each period
fn drive(
    scheduler: Arc<Mutex<Scheduler>>,
    pacing: Pacing,
    stop: Arc<AtomicBool>,
) -> Result<(), SimError> {
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();
        if let Err(err) = scheduler.lock().tick() {
            error!("run loop stopping: {}", err);
            return Err(err);
        }

        if let Pacing::Period(period) = pacing {
            let deadline = started + period;
            while !stop.load(Ordering::Acquire) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
        }
    }
    Ok(())
}
