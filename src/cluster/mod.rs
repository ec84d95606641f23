//! Cluster control plane boundary
//!
//! The scheduler only ever talks to the cluster through [`ControlPlane`]:
//! create a unit, delete a unit, watch units matching a selector.

pub mod memory;
pub mod unit;

use crate::core::labels::{LabelSelector, Labels};
use crate::core::state::UnitPhase;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{ControlPlaneCall, InMemoryControlPlane};
pub use unit::UnitDescriptor;

/// Error types for control plane operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPlaneError {
    #[error("unit '{0}' already exists")]
    AlreadyExists(String),

    #[error("unit '{0}' not found")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("control plane unavailable: {0}")]
    Unavailable(String),
}

/// Status of a unit as last reported
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitStatus {
    pub phase: UnitPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UnitStatus {
    pub fn new(phase: UnitPhase) -> Self {
        Self {
            phase,
            reason: None,
            message: None,
        }
    }
}

/// A unit as the control plane sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Authoritative identity, assigned by the control plane at creation
    pub uid: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub status: UnitStatus,
}

impl UnitSnapshot {
    /// Same unit, different status
    pub fn with_status(&self, status: UnitStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Same unit, different phase
    pub fn with_phase(&self, phase: UnitPhase) -> Self {
        self.with_status(UnitStatus::new(phase))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// One change delivered by a watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    #[serde(rename = "object")]
    pub unit: UnitSnapshot,
}

impl WatchEvent {
    pub fn modified(unit: UnitSnapshot) -> Self {
        Self {
            event_type: WatchEventType::Modified,
            unit,
        }
    }
}

/// Stream of changes for units matching a watch selector
pub type WatchStream = BoxStream<'static, Result<WatchEvent, ControlPlaneError>>;

/// The subset of a cluster API the scheduler needs
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a unit; the returned snapshot carries its uid and initial status
    async fn create_unit(
        &self,
        namespace: &str,
        unit: &UnitDescriptor,
    ) -> Result<UnitSnapshot, ControlPlaneError>;

    /// Delete a unit by name
    async fn delete_unit(&self, namespace: &str, name: &str) -> Result<(), ControlPlaneError>;

    /// Subscribe to changes of units in `namespace` matching `selector`
    ///
    /// The subscription is established when this returns; changes made after
    /// that point are delivered on the stream.
    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<WatchStream, ControlPlaneError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_event_wire_format() {
        let json = r#"{
            "type": "MODIFIED",
            "object": {
                "uid": "6f1c",
                "namespace": "ci",
                "name": "ci-1-build",
                "status": {"phase": "Running"}
            }
        }"#;

        let event: WatchEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, WatchEventType::Modified);
        assert_eq!(event.unit.status.phase, UnitPhase::Running);
        assert!(event.unit.labels.is_empty());
    }

    #[test]
    fn test_with_phase_keeps_identity() {
        let unit = UnitSnapshot {
            uid: "u1".to_string(),
            namespace: "ci".to_string(),
            name: "ci-1-build".to_string(),
            labels: Labels::new(),
            status: UnitStatus::default(),
        };

        let failed = unit.with_phase(UnitPhase::Failed);
        assert_eq!(failed.uid, "u1");
        assert_eq!(failed.status.phase, UnitPhase::Failed);
        assert_eq!(unit.status.phase, UnitPhase::Pending);
    }
}
