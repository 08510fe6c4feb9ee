use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;

use crate::core::components::port_specs::PortDirection;
use crate::core::connections::port_validator::PortValidator;
use crate::core::connections::registry::LinkRegistry;
use crate::core::errors::{ConfigurationError, PvError};
use crate::core::execution::scheduler::SchedulerHandle;
use crate::core::types::{PortId, PortRef, Tick};
use crate::core::values::{Value, ValueType};
use crate::core::variables::subscription::{Subscription, SubscriptionHub, SubscriptionId};

/// A PV name resolved to its device port
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub pv: String,
    pub port: PortId,
    pub device: String,
    pub field: String,
    pub direction: PortDirection,
    pub value_type: ValueType,
}

impl Binding {
    /// Resolve `device.field` and check the requested direction against the port.
    ///
    /// With no direction the port's own direction is used.
    pub fn resolve(
        registry: &LinkRegistry,
        pv: &str,
        device: &str,
        field: &str,
        direction: Option<PortDirection>,
    ) -> Result<Self, ConfigurationError> {
        let port_id = registry.resolve(&PortRef::new(device, field))?;
        let port = registry.port(port_id);
        if let Some(expected) = direction {
            PortValidator::validate_direction(device, port, expected)?;
        }

        Ok(Self {
            pv: pv.to_string(),
            port: port_id,
            device: device.to_string(),
            field: field.to_string(),
            direction: port.direction,
            value_type: port.value_type,
        })
    }

    pub fn is_writable(&self) -> bool {
        self.direction == PortDirection::Input
    }
}

/// Exported description of one bound PV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    pub pv: String,
    pub device: String,
    pub field: String,
    pub value_type: ValueType,
    pub direction: PortDirection,
    pub writable: bool,
}

struct AdapterInner {
    bindings: RwLock<BTreeMap<String, Binding>>,
    registry: Arc<LinkRegistry>,
    scheduler: SchedulerHandle,
    hub: Arc<SubscriptionHub>,
}

/// Process-variable surface of a running simulation.
///
/// Reads see the last settled tick, writes to input-bound PVs are staged for
/// the next tick, and subscriptions stream per-tick value changes. The
/// adapter is cheap to clone and may be shared across PV server threads.
#[derive(Clone)]
pub struct VariableAdapter {
    inner: Arc<AdapterInner>,
}

impl VariableAdapter {
    pub fn new(
        registry: Arc<LinkRegistry>,
        scheduler: SchedulerHandle,
        hub: Arc<SubscriptionHub>,
    ) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                bindings: RwLock::new(BTreeMap::new()),
                registry,
                scheduler,
                hub,
            }),
        }
    }

    /// Bind a PV name to a device port
    pub fn bind(
        &self,
        pv: &str,
        device: &str,
        field: &str,
        direction: PortDirection,
    ) -> Result<(), ConfigurationError> {
        let binding = Binding::resolve(&self.inner.registry, pv, device, field, Some(direction))?;
        self.insert(binding)
    }

    /// Register an already resolved binding
    pub fn insert(&self, binding: Binding) -> Result<(), ConfigurationError> {
        let mut bindings = self.inner.bindings.write();
        if bindings.contains_key(&binding.pv) {
            return Err(ConfigurationError::DuplicateVariable(binding.pv));
        }
        debug!(
            "bound PV '{}' to {}.{} ({}, {})",
            binding.pv, binding.device, binding.field, binding.direction, binding.value_type
        );
        bindings.insert(binding.pv.clone(), binding);
        Ok(())
    }

    /// Last settled value of a PV
    pub fn get(&self, pv: &str) -> Result<Value, PvError> {
        self.read(pv).map(|(_, value)| value)
    }

    /// Last settled value together with the tick that produced it
    pub fn read(&self, pv: &str) -> Result<(Tick, Value), PvError> {
        let binding = self.lookup(pv)?;
        let settled = self.inner.scheduler.settled();
        Ok((settled.tick(), settled.value(binding.port).clone()))
    }

    /// Stage a write for the next tick.
    ///
    /// Returns once the value is queued; the device sees it on the next tick
    /// and `get` keeps returning the old value until that tick completes.
    pub fn put(&self, pv: &str, value: impl Into<Value>) -> Result<(), PvError> {
        let binding = self.lookup(pv)?;
        if !binding.is_writable() {
            return Err(PvError::ReadOnlyVariable(pv.to_string()));
        }

        let value = value.into();
        let actual = value.value_type();
        let value = value.coerce_to(binding.value_type).ok_or_else(|| PvError::TypeMismatch {
            pv: pv.to_string(),
            expected: binding.value_type,
            actual,
        })?;

        debug!("staged {} = {}", pv, value);
        self.inner.scheduler.stage(binding.port, value)
    }

    /// Stream of value changes of a PV, starting from the next tick
    pub fn subscribe(&self, pv: &str) -> Result<Subscription, PvError> {
        let binding = self.lookup(pv)?;
        self.inner.hub.open(pv, binding.port)
    }

    /// Cancel a subscription by id; returns whether it was open
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        self.inner.hub.cancel(id)
    }

    /// Every bound PV, sorted by name
    pub fn describe(&self) -> Vec<VariableInfo> {
        self.inner
            .bindings
            .read()
            .values()
            .map(|binding| VariableInfo {
                pv: binding.pv.clone(),
                device: binding.device.clone(),
                field: binding.field.clone(),
                value_type: binding.value_type,
                direction: binding.direction,
                writable: binding.is_writable(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.bindings.read().keys().cloned().collect()
    }

    pub fn contains(&self, pv: &str) -> bool {
        self.inner.bindings.read().contains_key(pv)
    }

    /// Number of open subscriptions across all PVs
    pub fn subscription_count(&self) -> usize {
        self.inner.hub.len()
    }

    /// End every open subscription
    pub fn close_subscriptions(&self) {
        info!("closing PV subscriptions");
        self.inner.hub.close_all();
    }

    fn lookup(&self, pv: &str) -> Result<Binding, PvError> {
        if self.inner.scheduler.is_halted() {
            return Err(PvError::SimulationHalted);
        }
        self.inner
            .bindings
            .read()
            .get(pv)
            .cloned()
            .ok_or_else(|| PvError::UnknownVariable(pv.to_string()))
    }
}
