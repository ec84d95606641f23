//! Scheduling and run tracking

pub mod builder;
pub mod run;
pub mod scheduler;
pub mod watch;

pub use builder::UnitBuilder;
pub use run::{PipelineRun, TrackedUnit, UnitUpdate};
pub use scheduler::{RunHandle, ScheduleError, Scheduler};
