//! mason - schedules CI pipelines as pods and tracks their runs

pub mod cli;
pub mod cluster;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use cluster::{ControlPlane, ControlPlaneError, InMemoryControlPlane, UnitDescriptor, UnitSnapshot};
pub use core::config::{PipelineConfig, ScheduleRequest, SchedulerConfig};
pub use core::{Pipeline, RunEvent, RunId, RunPhase, Step, UnitPhase, ValidationError};
pub use execution::{PipelineRun, RunHandle, ScheduleError, Scheduler, UnitBuilder};
