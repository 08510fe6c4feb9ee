use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;

use crate::core::components::io::{Inputs, Outputs};
use crate::core::components::port_specs::PortDirection;
use crate::core::components::traits::Device;
use crate::core::connections::registry::LinkRegistry;
use crate::core::errors::{ConfigurationError, DeviceFault, PvError, SimError, SimulationFault};
use crate::core::execution::config::{ConcurrencyMode, FaultPolicy, SchedulerConfig};
use crate::core::execution::execution_order::EvaluationOrder;
use crate::core::execution::snapshot::Snapshot;
use crate::core::types::{DeviceId, PortId, Tick, TickContext};
use crate::core::values::Value;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Ticking,
    /// Terminal; entered on a fatal fault
    Halted,
}

/// Observer notified at tick boundaries
pub trait TickObserver: Send + Sync {
    /// Called after `current` replaced `previous` as the settled snapshot
    fn on_tick_published(&self, previous: &Snapshot, current: &Snapshot);

    /// Called once when the scheduler enters `Halted`
    fn on_halt(&self) {}
}

/// Summary of one completed tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    /// Isolated faults recorded during the tick
    pub faults: Vec<SimulationFault>,
}

/// Scheduler counters for observers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub ticks_run: u64,
    pub faults_recorded: u64,
    pub last_tick_duration: Option<Duration>,
}

/// Bounded log of the most recent faults
#[derive(Debug)]
struct FaultLog {
    capacity: usize,
    entries: VecDeque<SimulationFault>,
    total: u64,
}

impl FaultLog {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
            total: 0,
        }
    }

    fn record(&mut self, fault: SimulationFault) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(fault);
    }
}

/// State shared between the tick driver and PV clients.
///
/// The settled snapshot is only replaced after a tick completes, and staged
/// writes are only drained when a tick starts.
struct SharedState {
    settled: RwLock<Arc<Snapshot>>,
    staged: Mutex<Vec<(PortId, Value)>>,
    state: RwLock<SchedulerState>,
    faults: Mutex<FaultLog>,
    last_tick_duration: Mutex<Option<Duration>>,
}

/// Cloneable handle onto the scheduler's published state and write queue
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<SharedState>,
}

impl SchedulerHandle {
    /// The last fully settled snapshot
    pub fn settled(&self) -> Arc<Snapshot> {
        self.shared.settled.read().clone()
    }

    /// Number of the last completed tick
    pub fn current_tick(&self) -> Tick {
        self.shared.settled.read().tick()
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.read()
    }

    pub fn is_halted(&self) -> bool {
        self.state() == SchedulerState::Halted
    }

    /// Stage an input override for the next tick that starts
    pub fn stage(&self, port: PortId, value: Value) -> Result<(), PvError> {
        if self.is_halted() {
            return Err(PvError::SimulationHalted);
        }
        self.shared.staged.lock().push((port, value));
        Ok(())
    }

    /// Number of writes waiting for the next tick
    pub fn staged_len(&self) -> usize {
        self.shared.staged.lock().len()
    }

    /// Most recent faults, oldest first
    pub fn faults(&self) -> Vec<SimulationFault> {
        self.shared.faults.lock().entries.iter().cloned().collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks_run: self.current_tick().value(),
            faults_recorded: self.shared.faults.lock().total,
            last_tick_duration: *self.shared.last_tick_duration.lock(),
        }
    }
}

struct DeviceSlot {
    device: Box<dyn Device>,
    fatal: bool,
}

enum Evaluator {
    Sequential,
    GlobalPool,
    Pool(rayon::ThreadPool),
}

/// Discrete-time scheduler driving every device once per tick.
///
/// Each tick walks the cached evaluation order stage by stage: inputs are
/// gathered from staged overrides, same-tick upstream outputs, delayed
/// links or the previous settled values; devices in a stage are evaluated
/// (optionally in parallel); results are applied in stage order. The new
/// snapshot is published only once every stage has finished.
pub struct Scheduler {
    registry: Arc<LinkRegistry>,
    devices: Vec<DeviceSlot>,
    order: EvaluationOrder,
    config: SchedulerConfig,
    evaluator: Evaluator,
    shared: Arc<SharedState>,
    observers: Vec<Arc<dyn TickObserver>>,
}

impl Scheduler {
    /// Create a scheduler for `devices`, given in registry declaration order
    pub fn new(
        registry: Arc<LinkRegistry>,
        devices: Vec<Box<dyn Device>>,
        config: SchedulerConfig,
    ) -> Result<Self, ConfigurationError> {
        if !(config.tick_seconds.is_finite() && config.tick_seconds > 0.0) {
            return Err(ConfigurationError::InvalidTickLength(config.tick_seconds));
        }
        if devices.len() != registry.device_count() {
            return Err(ConfigurationError::DeviceCountMismatch {
                devices: devices.len(),
                declared: registry.device_count(),
            });
        }

        let order = registry.evaluation_order()?;
        let evaluator = match (config.concurrency_mode, config.thread_pool_size) {
            (ConcurrencyMode::Sequential, _) => Evaluator::Sequential,
            (ConcurrencyMode::Rayon, None) => Evaluator::GlobalPool,
            (ConcurrencyMode::Rayon, Some(threads)) => Evaluator::Pool(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("s03-eval-{}", index))
                    .build()
                    .map_err(|err| ConfigurationError::ThreadPool(err.to_string()))?,
            ),
        };

        info!(
            "scheduler ready: {} devices in {} stages, {:?} evaluation",
            order.device_count(),
            order.stage_count(),
            config.concurrency_mode
        );

        let shared = Arc::new(SharedState {
            settled: RwLock::new(Arc::new(Snapshot::initial(&registry))),
            staged: Mutex::new(Vec::new()),
            state: RwLock::new(SchedulerState::Idle),
            faults: Mutex::new(FaultLog::new(config.fault_log_capacity)),
            last_tick_duration: Mutex::new(None),
        });

        Ok(Self {
            registry,
            devices: devices
                .into_iter()
                .map(|device| DeviceSlot {
                    device,
                    fatal: false,
                })
                .collect(),
            order,
            config,
            evaluator,
            shared,
            observers: Vec::new(),
        })
    }

    /// Escalate any fault of `device` to a halt
    pub fn set_fatal(&mut self, device: DeviceId, fatal: bool) {
        if let Some(slot) = self.devices.get_mut(device.0) {
            slot.fatal = fatal;
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TickObserver>) {
        self.observers.push(observer);
    }

    pub fn order(&self) -> &EvaluationOrder {
        &self.order
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.read()
    }

    pub fn current_tick(&self) -> Tick {
        self.shared.settled.read().tick()
    }

    /// Run one tick: `Idle -> Ticking -> Idle`.
    ///
    /// A fatal fault aborts the tick without publishing anything and leaves
    /// the scheduler `Halted`; every later call fails with [`SimError::Halted`].
    pub fn tick(&mut self) -> Result<TickReport, SimError> {
        if self.state() == SchedulerState::Halted {
            return Err(SimError::Halted);
        }
        let started = Instant::now();
        *self.shared.state.write() = SchedulerState::Ticking;
        let _ticking = TickingGuard(self.shared.clone());

        // Arrival order; the last write to a port wins
        let staged = std::mem::take(&mut *self.shared.staged.lock());
        let overrides: HashMap<PortId, Value> = staged.into_iter().collect();

        let previous = self.shared.settled.read().clone();
        let tick = previous.tick().next();
        let ctx = TickContext::new(tick, self.config.tick_seconds);
        let mut working = (*previous).clone();
        working.advance_to(tick);

        debug!("=== Simulation Tick {} ({} overrides) ===", tick, overrides.len());

        let mut faults = Vec::new();
        for stage in self.order.stages() {
            let inputs: Vec<Inputs> = stage
                .iter()
                .map(|&device| {
                    gather_inputs(&self.registry, device, &overrides, &previous, &mut working)
                })
                .collect();

            let results = evaluate_stage(&mut self.devices, stage, &inputs, &ctx, &self.evaluator);

            for (&device, result) in stage.iter().zip(results) {
                match result.and_then(|outputs| validate_outputs(&self.registry, device, outputs)) {
                    Ok(values) => {
                        for (port, value) in values {
                            working.set(port, value);
                        }
                    }
                    Err(fault) => {
                        let fault = SimulationFault {
                            device: self.registry.device(device).name.clone(),
                            tick,
                            reason: fault.reason().to_string(),
                        };
                        if self.devices[device.0].fatal
                            || self.config.fault_policy == FaultPolicy::Fatal
                        {
                            self.halt(fault.clone());
                            return Err(SimError::FatalFault(fault));
                        }
                        warn!("{}; holding previous inputs and outputs", fault);
                        restore_inputs(&self.registry, device, &previous, &mut working);
                        self.shared.faults.lock().record(fault.clone());
                        faults.push(fault);
                    }
                }
            }
        }

        let current = Arc::new(working);
        *self.shared.settled.write() = current.clone();
        *self.shared.last_tick_duration.lock() = Some(started.elapsed());
        *self.shared.state.write() = SchedulerState::Idle;

        for observer in &self.observers {
            observer.on_tick_published(&previous, &current);
        }

        Ok(TickReport { tick, faults })
    }

    fn halt(&self, fault: SimulationFault) {
        error!("{}; halting scheduler", fault);
        self.shared.faults.lock().record(fault);
        self.shared.staged.lock().clear();
        *self.shared.state.write() = SchedulerState::Halted;
        for observer in &self.observers {
            observer.on_halt();
        }
    }
}

/// Returns a tick that unwound out of a device update to `Idle`
struct TickingGuard(Arc<SharedState>);

impl Drop for TickingGuard {
    fn drop(&mut self) {
        let mut state = self.0.state.write();
        if *state == SchedulerState::Ticking {
            error!("tick unwound before completing; nothing was published");
            *state = SchedulerState::Idle;
        }
    }
}

/// Undo the inputs a faulted device rejected so they are not offered again
fn restore_inputs(
    registry: &LinkRegistry,
    device: DeviceId,
    previous: &Snapshot,
    working: &mut Snapshot,
) {
    for &port_id in registry.device(device).ports() {
        if registry.port(port_id).direction == PortDirection::Input {
            working.set(port_id, previous.value(port_id).clone());
        }
    }
}

/// Build a device's input snapshot and record it in the working snapshot
fn gather_inputs(
    registry: &LinkRegistry,
    device: DeviceId,
    overrides: &HashMap<PortId, Value>,
    previous: &Snapshot,
    working: &mut Snapshot,
) -> Inputs {
    let mut inputs = Inputs::new();
    for &port_id in registry.device(device).ports() {
        let port = registry.port(port_id);
        if port.direction != PortDirection::Input {
            continue;
        }

        let value = if let Some(value) = overrides.get(&port_id) {
            value.clone()
        } else if let Some(link) = registry.upstream_link(port_id) {
            if link.delayed {
                previous.value(link.source).clone()
            } else {
                // Upstream sits in an earlier stage, so this is already this tick's value
                working.value(link.source).clone()
            }
        } else {
            previous.value(port_id).clone()
        };

        working.set(port_id, value.clone());
        inputs.insert(&port.name, value);
    }
    inputs
}

fn evaluate_stage(
    devices: &mut [DeviceSlot],
    stage: &[DeviceId],
    inputs: &[Inputs],
    ctx: &TickContext,
    evaluator: &Evaluator,
) -> Vec<Result<Outputs, DeviceFault>> {
    // Stages are sorted by id, so one pass hands out disjoint mutable borrows
    let mut wanted = stage.iter().zip(inputs).peekable();
    let mut jobs: Vec<(&mut DeviceSlot, &Inputs)> = Vec::with_capacity(stage.len());
    for (index, slot) in devices.iter_mut().enumerate() {
        if let Some((_, device_inputs)) = wanted.next_if(|(id, _)| id.0 == index) {
            jobs.push((slot, device_inputs));
        }
    }

    match evaluator {
        Evaluator::Pool(pool) if jobs.len() > 1 => {
            pool.install(|| jobs.into_par_iter().map(|job| run_device(job, ctx)).collect())
        }
        Evaluator::GlobalPool if jobs.len() > 1 => {
            jobs.into_par_iter().map(|job| run_device(job, ctx)).collect()
        }
        _ => jobs.into_iter().map(|job| run_device(job, ctx)).collect(),
    }
}

fn run_device(job: (&mut DeviceSlot, &Inputs), ctx: &TickContext) -> Result<Outputs, DeviceFault> {
    let (slot, inputs) = job;
    slot.device.update(inputs, ctx)
}

/// Map output names to ports, rejecting undeclared ports and wrong types
fn validate_outputs(
    registry: &LinkRegistry,
    device: DeviceId,
    outputs: Outputs,
) -> Result<Vec<(PortId, Value)>, DeviceFault> {
    let mut validated = Vec::with_capacity(outputs.len());
    for (name, value) in outputs.into_values() {
        let port_id = registry
            .port_id(device, &name)
            .filter(|id| registry.port(*id).direction == PortDirection::Output)
            .ok_or_else(|| DeviceFault::new(format!("produced undeclared output '{}'", name)))?;

        let expected = registry.port(port_id).value_type;
        let actual = value.value_type();
        let value = value.coerce_to(expected).ok_or_else(|| {
            DeviceFault::new(format!("output '{}' expects {}, got {}", name, expected, actual))
        })?;
        validated.push((port_id, value));
    }
    Ok(validated)
}
