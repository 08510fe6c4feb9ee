//! Configuration for scheduler execution.
//!
//! Controls concurrency within a stage, tick length in simulated time,
//! wall-clock pacing of the run loop, fault escalation and buffering of
//! subscriptions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Enumeration of supported concurrency modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// Devices are evaluated one after another on the tick thread
    #[default]
    Sequential,
    /// Devices within one stage are evaluated in parallel using Rayon
    Rayon,
}

/// How the run loop spaces ticks in wall-clock time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pacing {
    /// Run ticks back to back
    #[default]
    AsFastAsPossible,
    /// Start at most one tick per period
    Period(Duration),
}

/// What a device fault does to the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Hold the faulting device's outputs stale and keep ticking
    #[default]
    Isolate,
    /// Halt the scheduler on any fault
    Fatal,
}

/// Configuration for scheduler execution
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// The concurrency mode to use for evaluating a stage
    pub concurrency_mode: ConcurrencyMode,
    /// The size of the thread pool for parallel evaluation.
    /// Only relevant when concurrency_mode is Rayon; `None` uses the global pool
    pub thread_pool_size: Option<usize>,
    /// Simulated seconds covered by one tick
    pub tick_seconds: f64,
    /// Wall-clock pacing of the background run loop
    pub pacing: Pacing,
    /// Escalation policy for device faults
    pub fault_policy: FaultPolicy,
    /// Number of most recent faults kept for observers
    pub fault_log_capacity: usize,
    /// Events buffered per subscription before the oldest is dropped
    pub subscription_buffer: usize,
}

impl SchedulerConfig {
    /// Create a new configuration with default values
    ///
    /// Sequential evaluation, one simulated second per tick, no pacing,
    /// isolated faults.
    pub fn new() -> Self {
        Self {
            concurrency_mode: ConcurrencyMode::default(),
            thread_pool_size: None,
            tick_seconds: 1.0,
            pacing: Pacing::default(),
            fault_policy: FaultPolicy::default(),
            fault_log_capacity: 256,
            subscription_buffer: 64,
        }
    }

    /// Set the concurrency mode for stage evaluation
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency_mode = mode;
        self
    }

    /// Set the thread pool size for parallel evaluation
    ///
    /// # Note
    /// This setting only affects execution when concurrency_mode is Rayon
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    /// Set the simulated length of one tick; must be positive and finite
    pub fn with_tick_seconds(mut self, seconds: f64) -> Self {
        self.tick_seconds = seconds;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_fault_log_capacity(mut self, capacity: usize) -> Self {
        self.fault_log_capacity = capacity;
        self
    }

    /// Set the per-subscription buffer; clamped to at least one event
    pub fn with_subscription_buffer(mut self, capacity: usize) -> Self {
        self.subscription_buffer = capacity.max(1);
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
