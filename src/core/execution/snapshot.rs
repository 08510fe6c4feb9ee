use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::connections::registry::LinkRegistry;
use crate::core::types::{PortId, Tick};
use crate::core::values::Value;

/// Port values of one completed tick, indexed by port id.
///
/// Input ports hold the value their device consumed, output ports the value
/// it produced (or held stale after a fault).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    tick: Tick,
    values: Vec<Value>,
}

impl Snapshot {
    /// Tick 0 snapshot built from every port's initial value
    pub fn initial(registry: &LinkRegistry) -> Self {
        Self {
            tick: Tick::ZERO,
            values: registry.ports().map(|(_, port)| port.initial.clone()).collect(),
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn value(&self, port: PortId) -> &Value {
        &self.values[port.0]
    }

    pub(crate) fn set(&mut self, port: PortId, value: Value) {
        self.values[port.0] = value;
    }

    pub(crate) fn advance_to(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Name-keyed copy for export and comparison
    pub fn view(&self, registry: &LinkRegistry) -> SnapshotView {
        SnapshotView {
            tick: self.tick,
            values: registry
                .ports()
                .map(|(id, _)| (registry.port_label(id), self.values[id.0].clone()))
                .collect(),
        }
    }
}

/// Serializable, name-keyed view of a settled snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotView {
    pub tick: Tick,
    pub values: BTreeMap<String, Value>,
}

impl SnapshotView {
    /// Look up a value by `device.port` label
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.values.get(label)
    }
}
