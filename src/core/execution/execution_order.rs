use std::collections::HashMap;

use crate::core::connections::registry::LinkRegistry;
use crate::core::errors::ConfigurationError;
use crate::core::types::DeviceId;

/// Topologically sorted device order for one tick.
///
/// Devices are grouped into stages: every device sits in a later stage than
/// each device feeding it through an undelayed link, and devices in the same
/// stage are independent of each other. Within a stage devices keep their
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOrder {
    stages: Vec<Vec<DeviceId>>,
}

impl EvaluationOrder {
    pub fn stages(&self) -> &[Vec<DeviceId>] {
        &self.stages
    }

    /// Flattened sequence, stage by stage
    pub fn flattened(&self) -> Vec<DeviceId> {
        self.stages.iter().flatten().copied().collect()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn device_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Stage index of a device
    pub fn stage_of(&self, device: DeviceId) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.contains(&device))
    }
}

/// Manages topological sorting and execution order calculation for devices
pub struct ExecutionOrderBuilder;

impl ExecutionOrderBuilder {
    /// Analyzes the link graph to build a stage-based topological order.
    ///
    /// Uses a level-by-level Kahn's algorithm. Delayed links carry last
    /// tick's value and therefore add no ordering edge. If some devices can
    /// never reach zero in-degree they sit on an undelayed cycle.
    pub fn build(registry: &LinkRegistry) -> Result<EvaluationOrder, ConfigurationError> {
        let device_count = registry.device_count();
        let mut adj_list: Vec<Vec<DeviceId>> = vec![Vec::new(); device_count];
        let mut in_degree: HashMap<DeviceId, usize> = registry
            .devices()
            .map(|(id, _)| (id, 0))
            .collect();

        // Build adjacency list and in-degrees from undelayed links
        for link in registry.links().iter().filter(|link| !link.delayed) {
            let source = registry.port(link.source).device;
            let target = registry.port(link.target).device;
            adj_list[source.0].push(target);
            if let Some(degree) = in_degree.get_mut(&target) {
                *degree += 1;
            }
        }

        let mut stages = Vec::new();
        while !in_degree.is_empty() {
            // Find all devices with zero in-degree (current stage)
            let mut current_stage: Vec<DeviceId> = in_degree
                .iter()
                .filter(|(_, &degree)| degree == 0)
                .map(|(id, _)| *id)
                .collect();

            if current_stage.is_empty() {
                let mut remaining: Vec<DeviceId> = in_degree.keys().copied().collect();
                remaining.sort();
                return Err(ConfigurationError::CyclicTopology {
                    devices: remaining
                        .into_iter()
                        .map(|id| registry.device(id).name.clone())
                        .collect(),
                });
            }

            // Declaration order breaks ties
            current_stage.sort();

            for device in &current_stage {
                in_degree.remove(device);
                for neighbor in &adj_list[device.0] {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                    }
                }
            }

            stages.push(current_stage);
        }

        Ok(EvaluationOrder { stages })
    }
}
