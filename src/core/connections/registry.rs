use std::collections::HashMap;

use log::debug;

use crate::core::components::port_specs::{PortDirection, PortSpec};
use crate::core::connections::port_validator::PortValidator;
use crate::core::errors::ConfigurationError;
use crate::core::execution::execution_order::{EvaluationOrder, ExecutionOrderBuilder};
use crate::core::types::{DeviceId, LinkId, PortId, PortRef};
use crate::core::values::{Value, ValueType};

/// A device slot in the registry arena
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub name: String,
    pub type_tag: String,
    ports: Vec<PortId>,
}

impl DeviceEntry {
    /// Ports in declaration order
    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }
}

/// A declared port in the registry arena
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub device: DeviceId,
    pub name: String,
    pub direction: PortDirection,
    pub value_type: ValueType,
    pub initial: Value,
}

/// A directed edge from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub source: PortId,
    pub target: PortId,
    /// The consumer observes the producer's previous-tick value
    pub delayed: bool,
}

/// Port and link registry forming the device composition graph.
///
/// Devices, ports and links live in flat arenas addressed by index, so the
/// graph may contain cycles without any ownership cycles.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    devices: Vec<DeviceEntry>,
    device_index: HashMap<String, DeviceId>,
    ports: Vec<Port>,
    port_index: HashMap<(DeviceId, String), PortId>,
    links: Vec<Link>,
    /// input port -> the single link driving it
    upstream: HashMap<PortId, LinkId>,
    /// output port -> links it fans out to
    downstream: HashMap<PortId, Vec<LinkId>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; ids are handed out in declaration order
    pub fn add_device(&mut self, name: &str, type_tag: &str) -> Result<DeviceId, ConfigurationError> {
        if name.is_empty() || name.contains('.') {
            return Err(ConfigurationError::InvalidDeviceName(name.to_string()));
        }
        if self.device_index.contains_key(name) {
            return Err(ConfigurationError::DuplicateDevice(name.to_string()));
        }

        let id = DeviceId(self.devices.len());
        self.devices.push(DeviceEntry {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            ports: Vec::new(),
        });
        self.device_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare a named, typed port on a device
    pub fn declare_port(
        &mut self,
        device: DeviceId,
        name: &str,
        direction: PortDirection,
        value_type: ValueType,
        initial: Value,
    ) -> Result<PortId, ConfigurationError> {
        let device_name = self
            .devices
            .get(device.0)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| ConfigurationError::UnknownDevice(device.to_string()))?;

        if self.port_index.contains_key(&(device, name.to_string())) {
            return Err(ConfigurationError::DuplicatePort {
                device: device_name,
                port: name.to_string(),
            });
        }
        let initial = initial
            .clone()
            .coerce_to(value_type)
            .ok_or_else(|| ConfigurationError::InitialValueType {
                device: device_name.clone(),
                port: name.to_string(),
                expected: value_type,
                actual: initial.value_type(),
            })?;

        let id = PortId(self.ports.len());
        self.ports.push(Port {
            device,
            name: name.to_string(),
            direction,
            value_type,
            initial,
        });
        self.port_index.insert((device, name.to_string()), id);
        self.devices[device.0].ports.push(id);
        Ok(id)
    }

    /// Declare a port from a device's own port specification
    pub fn declare_spec(&mut self, device: DeviceId, spec: &PortSpec) -> Result<PortId, ConfigurationError> {
        self.declare_port(
            device,
            &spec.name,
            spec.direction,
            spec.value_type,
            spec.initial.clone(),
        )
    }

    /// Connect an output port to an input port.
    ///
    /// Rejects swapped directions, mismatched types and a second driver for
    /// an input port. Cycles are only detected by [`LinkRegistry::evaluation_order`].
    pub fn connect(
        &mut self,
        source: PortId,
        target: PortId,
        delayed: bool,
    ) -> Result<LinkId, ConfigurationError> {
        let source_port = self.checked_port(source)?;
        let target_port = self.checked_port(target)?;
        let source_device = &self.devices[source_port.device.0].name;
        let target_device = &self.devices[target_port.device.0].name;

        PortValidator::validate_source_port(source_device, source_port)?;
        PortValidator::validate_target_port(target_device, target_port)?;
        PortValidator::validate_types(source_device, source_port, target_device, target_port)?;

        if let Some(existing) = self.upstream.get(&target) {
            let existing = self.links[existing.0].source;
            return Err(ConfigurationError::InputAlreadyLinked {
                port: self.port_label(target),
                existing: self.port_label(existing),
            });
        }

        let id = LinkId(self.links.len());
        self.links.push(Link {
            source,
            target,
            delayed,
        });
        self.upstream.insert(target, id);
        self.downstream.entry(source).or_default().push(id);

        debug!(
            "linked {} -> {}{}",
            self.port_label(source),
            self.port_label(target),
            if delayed { " (delayed)" } else { "" }
        );
        Ok(id)
    }

    /// Connect two ports by name
    pub fn connect_refs(
        &mut self,
        source: &PortRef,
        target: &PortRef,
        delayed: bool,
    ) -> Result<LinkId, ConfigurationError> {
        let source = self.resolve(source)?;
        let target = self.resolve(target)?;
        self.connect(source, target, delayed)
    }

    /// Resolve a `device.port` handle to a port id
    pub fn resolve(&self, port: &PortRef) -> Result<PortId, ConfigurationError> {
        let device = self
            .device_id(port.device())
            .ok_or_else(|| ConfigurationError::UnknownDevice(port.device().to_string()))?;
        self.port_id(device, port.port())
            .ok_or_else(|| ConfigurationError::UnknownPort {
                device: port.device().to_string(),
                port: port.port().to_string(),
            })
    }

    /// Build the topological evaluation order for one tick
    pub fn evaluation_order(&self) -> Result<EvaluationOrder, ConfigurationError> {
        ExecutionOrderBuilder::build(self)
    }

    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.device_index.get(name).copied()
    }

    pub fn port_id(&self, device: DeviceId, name: &str) -> Option<PortId> {
        self.port_index.get(&(device, name.to_string())).copied()
    }

    pub fn device(&self, id: DeviceId) -> &DeviceEntry {
        &self.devices[id.0]
    }

    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.0]
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &DeviceEntry)> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, entry)| (DeviceId(index), entry))
    }

    pub fn ports(&self) -> impl Iterator<Item = (PortId, &Port)> {
        self.ports
            .iter()
            .enumerate()
            .map(|(index, port)| (PortId(index), port))
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The link driving an input port, if any
    pub fn upstream_link(&self, input: PortId) -> Option<&Link> {
        self.upstream.get(&input).map(|id| &self.links[id.0])
    }

    /// Links fanned out from an output port
    pub fn downstream_links(&self, output: PortId) -> impl Iterator<Item = &Link> {
        self.downstream
            .get(&output)
            .into_iter()
            .flatten()
            .map(move |id| &self.links[id.0])
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// `device.port` label used in logs and errors
    pub fn port_label(&self, id: PortId) -> String {
        let port = &self.ports[id.0];
        format!("{}.{}", self.devices[port.device.0].name, port.name)
    }

    /// Get link statistics for debugging
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            devices: self.devices.len(),
            ports: self.ports.len(),
            links: self.links.len(),
            delayed_links: self.links.iter().filter(|link| link.delayed).count(),
        }
    }

    fn checked_port(&self, id: PortId) -> Result<&Port, ConfigurationError> {
        self.ports
            .get(id.0)
            .ok_or_else(|| ConfigurationError::UnknownPort {
                device: "?".to_string(),
                port: format!("#{}", id.0),
            })
    }
}

/// Registry statistics for debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub devices: usize,
    pub ports: usize,
    pub links: usize,
    pub delayed_links: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_pair() -> (LinkRegistry, PortId, PortId) {
        let mut registry = LinkRegistry::new();
        let a = registry.add_device("a", "test").unwrap();
        let b = registry.add_device("b", "test").unwrap();
        let out = registry
            .declare_port(a, "out", PortDirection::Output, ValueType::Float, Value::Float(0.0))
            .unwrap();
        let inp = registry
            .declare_port(b, "in", PortDirection::Input, ValueType::Float, Value::Float(0.0))
            .unwrap();
        (registry, out, inp)
    }

    #[test]
    fn test_connect_output_to_input() {
        let (mut registry, out, inp) = registry_with_pair();
        registry.connect(out, inp, false).unwrap();

        assert_eq!(registry.upstream_link(inp).map(|l| l.source), Some(out));
        assert_eq!(registry.downstream_links(out).count(), 1);
        assert_eq!(registry.stats().links, 1);
    }

    #[test]
    fn test_connect_rejects_swapped_roles() {
        let (mut registry, out, inp) = registry_with_pair();
        let err = registry.connect(inp, out, false).unwrap_err();
        assert!(matches!(err, ConfigurationError::DirectionMismatch { .. }));
    }

    #[test]
    fn test_connect_rejects_second_driver() {
        let (mut registry, out, inp) = registry_with_pair();
        let c = registry.add_device("c", "test").unwrap();
        let other = registry
            .declare_port(c, "out", PortDirection::Output, ValueType::Float, Value::Float(0.0))
            .unwrap();

        registry.connect(out, inp, false).unwrap();
        let err = registry.connect(other, inp, false).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InputAlreadyLinked {
                port: "b.in".to_string(),
                existing: "a.out".to_string(),
            }
        );
    }

    #[test]
    fn test_output_fans_out() {
        let (mut registry, out, inp) = registry_with_pair();
        let c = registry.add_device("c", "test").unwrap();
        let second = registry
            .declare_port(c, "in", PortDirection::Input, ValueType::Float, Value::Float(0.0))
            .unwrap();

        registry.connect(out, inp, false).unwrap();
        registry.connect(out, second, true).unwrap();
        assert_eq!(registry.downstream_links(out).count(), 2);
        assert_eq!(registry.stats().delayed_links, 1);
    }

    #[test]
    fn test_connect_rejects_type_mismatch() {
        let (mut registry, out, _) = registry_with_pair();
        let c = registry.add_device("c", "test").unwrap();
        let flag = registry
            .declare_port(c, "flag", PortDirection::Input, ValueType::Bool, Value::Bool(false))
            .unwrap();

        let err = registry.connect(out, flag, false).unwrap_err();
        assert!(matches!(err, ConfigurationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_duplicate_declarations_rejected() {
        let (mut registry, _, _) = registry_with_pair();
        assert!(matches!(
            registry.add_device("a", "test"),
            Err(ConfigurationError::DuplicateDevice(_))
        ));
        let a = registry.device_id("a").unwrap();
        assert!(matches!(
            registry.declare_port(a, "out", PortDirection::Output, ValueType::Int, Value::Int(0)),
            Err(ConfigurationError::DuplicatePort { .. })
        ));
        assert!(matches!(
            registry.add_device("bad.name", "test"),
            Err(ConfigurationError::InvalidDeviceName(_))
        ));
    }

    #[test]
    fn test_initial_value_is_coerced_or_rejected() {
        let mut registry = LinkRegistry::new();
        let a = registry.add_device("a", "test").unwrap();
        let port = registry
            .declare_port(a, "x", PortDirection::Input, ValueType::Float, Value::Int(2))
            .unwrap();
        assert_eq!(registry.port(port).initial, Value::Float(2.0));

        let err = registry
            .declare_port(a, "y", PortDirection::Input, ValueType::Bool, Value::Int(2))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InitialValueType { .. }));
    }

    #[test]
    fn test_resolve_by_name() {
        let (mut registry, out, inp) = registry_with_pair();
        registry
            .connect_refs(&PortRef::new("a", "out"), &PortRef::new("b", "in"), false)
            .unwrap();
        assert_eq!(registry.resolve(&PortRef::new("a", "out")).unwrap(), out);
        assert_eq!(registry.resolve(&PortRef::new("b", "in")).unwrap(), inp);
        assert!(matches!(
            registry.resolve(&PortRef::new("a", "nope")),
            Err(ConfigurationError::UnknownPort { .. })
        ));
    }
}
