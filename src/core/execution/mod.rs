pub mod config;
pub mod execution_order;
pub mod scheduler;
pub mod snapshot;

// Re-export commonly used types
pub use config::{ConcurrencyMode, FaultPolicy, Pacing, SchedulerConfig};
pub use execution_order::{EvaluationOrder, ExecutionOrderBuilder};
pub use scheduler::{
    Scheduler, SchedulerHandle, SchedulerState, SchedulerStats, TickObserver, TickReport,
};
pub use snapshot::{Snapshot, SnapshotView};
