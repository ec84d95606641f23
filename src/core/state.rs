//! Run and unit state models

use crate::core::naming::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall phase of a pipeline run
///
/// Only moves forward: `Pending < Running < {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// No unit has been observed running yet
    Pending,
    /// At least one unit has been observed running
    Running,
    /// Every unit finished and none failed
    Succeeded,
    /// Every unit finished and at least one failed
    Failed,
}

impl RunPhase {
    /// Position in the phase ordering; the two terminal phases share a rank
    pub fn rank(self) -> u8 {
        match self {
            RunPhase::Pending => 0,
            RunPhase::Running => 1,
            RunPhase::Succeeded | RunPhase::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Pending => "PENDING",
            RunPhase::Running => "RUNNING",
            RunPhase::Succeeded => "SUCCEEDED",
            RunPhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Phase of a single unit as reported by the control plane
///
/// Serialized with the control plane's spelling (`"Running"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The control plane lost track of the unit; neither running nor finished
    Unknown,
}

impl UnitPhase {
    /// Finished, successfully or not
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitPhase::Succeeded | UnitPhase::Failed)
    }
}

impl fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitPhase::Pending => "Pending",
            UnitPhase::Running => "Running",
            UnitPhase::Succeeded => "Succeeded",
            UnitPhase::Failed => "Failed",
            UnitPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A unit that finished in [`UnitPhase::Failed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub uid: String,
    pub name: String,
    pub step_name: String,
    /// Reason reported by the control plane, if any
    pub message: Option<String>,
}

/// Transition notification emitted by a run
///
/// A finishing update always yields `Completed` followed by exactly one of
/// `Succeeded` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Running { run_id: RunId },
    Completed { run_id: RunId },
    Succeeded { run_id: RunId },
    Failed { run_id: RunId, failed_units: Vec<FailedUnit> },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            RunEvent::Running { run_id }
            | RunEvent::Completed { run_id }
            | RunEvent::Succeeded { run_id }
            | RunEvent::Failed { run_id, .. } => run_id,
        }
    }

    /// The run phase this event moves to, if it is a phase change
    pub fn phase(&self) -> Option<RunPhase> {
        match self {
            RunEvent::Running { .. } => Some(RunPhase::Running),
            RunEvent::Succeeded { .. } => Some(RunPhase::Succeeded),
            RunEvent::Failed { .. } => Some(RunPhase::Failed),
            RunEvent::Completed { .. } => None,
        }
    }
}
