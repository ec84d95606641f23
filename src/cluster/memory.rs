//! In-process control plane
//!
//! Keeps units in memory, assigns uids and fans status changes out to
//! watchers. Tests drive unit lifecycles with [`InMemoryControlPlane::set_phase`].

use super::{
    ControlPlane, ControlPlaneError, UnitDescriptor, UnitSnapshot, UnitStatus, WatchEvent,
    WatchEventType, WatchStream,
};
use crate::core::labels::LabelSelector;
use crate::core::state::UnitPhase;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Recorded control plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    Create { namespace: String, name: String },
    Delete { namespace: String, name: String },
    Watch { namespace: String, selector: String },
}

struct StoredUnit {
    descriptor: UnitDescriptor,
    snapshot: UnitSnapshot,
}

struct Watcher {
    namespace: String,
    selector: LabelSelector,
    tx: mpsc::UnboundedSender<Result<WatchEvent, ControlPlaneError>>,
}

#[derive(Default)]
struct State {
    units: BTreeMap<(String, String), StoredUnit>,
    watchers: Vec<Watcher>,
    calls: Vec<ControlPlaneCall>,
    create_failures: HashMap<String, ControlPlaneError>,
    delete_failures: HashMap<String, ControlPlaneError>,
}

impl State {
    fn broadcast(&mut self, event: WatchEvent) {
        self.watchers.retain(|w| {
            if w.namespace == event.unit.namespace && w.selector.matches(&event.unit.labels) {
                w.tx.unbounded_send(Ok(event.clone())).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }
}

/// Control plane that lives entirely in memory
#[derive(Clone, Default)]
pub struct InMemoryControlPlane {
    state: Arc<Mutex<State>>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.lock().calls.clone()
    }

    /// Snapshots of every unit currently stored, ordered by namespace and name
    pub fn units(&self) -> Vec<UnitSnapshot> {
        self.lock().units.values().map(|u| u.snapshot.clone()).collect()
    }

    pub fn unit(&self, namespace: &str, name: &str) -> Option<UnitSnapshot> {
        self.lock()
            .units
            .get(&(namespace.to_string(), name.to_string()))
            .map(|u| u.snapshot.clone())
    }

    /// The descriptor a unit was created from
    pub fn descriptor(&self, namespace: &str, name: &str) -> Option<UnitDescriptor> {
        self.lock()
            .units
            .get(&(namespace.to_string(), name.to_string()))
            .map(|u| u.descriptor.clone())
    }

    /// Make the next creation of unit `name` fail with `error`
    pub fn fail_create(&self, name: impl Into<String>, error: ControlPlaneError) {
        self.lock().create_failures.insert(name.into(), error);
    }

    /// Make the next deletion of unit `name` fail with `error`
    pub fn fail_delete(&self, name: impl Into<String>, error: ControlPlaneError) {
        self.lock().delete_failures.insert(name.into(), error);
    }

    /// Number of open watch subscriptions
    pub fn watcher_count(&self) -> usize {
        let mut state = self.lock();
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.len()
    }

    /// Set a unit's phase and notify watchers; returns the new snapshot
    pub fn set_phase(&self, namespace: &str, name: &str, phase: UnitPhase) -> Option<UnitSnapshot> {
        self.set_status(namespace, name, UnitStatus::new(phase))
    }

    /// Replace a unit's status and notify watchers with a `MODIFIED` event
    pub fn set_status(&self, namespace: &str, name: &str, status: UnitStatus) -> Option<UnitSnapshot> {
        let mut state = self.lock();
        let stored = state
            .units
            .get_mut(&(namespace.to_string(), name.to_string()))?;
        stored.snapshot.status = status;
        let snapshot = stored.snapshot.clone();
        debug!("{}/{} is now {}", namespace, name, snapshot.status.phase);
        state.broadcast(WatchEvent::modified(snapshot.clone()));
        Some(snapshot)
    }

    /// Deliver an arbitrary event to matching watchers
    pub fn emit(&self, event: WatchEvent) {
        self.lock().broadcast(event);
    }

    /// End every open watch stream
    pub fn close_watches(&self) {
        self.lock().watchers.clear();
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn create_unit(
        &self,
        namespace: &str,
        unit: &UnitDescriptor,
    ) -> Result<UnitSnapshot, ControlPlaneError> {
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Create {
            namespace: namespace.to_string(),
            name: unit.name().to_string(),
        });

        if let Some(error) = state.create_failures.remove(unit.name()) {
            return Err(error);
        }

        if unit.namespace() != namespace {
            return Err(ControlPlaneError::Rejected(format!(
                "unit namespace '{}' does not match request namespace '{}'",
                unit.namespace(),
                namespace
            )));
        }

        let key = (namespace.to_string(), unit.name().to_string());
        if state.units.contains_key(&key) {
            return Err(ControlPlaneError::AlreadyExists(unit.name().to_string()));
        }

        let snapshot = UnitSnapshot {
            uid: Uuid::new_v4().to_string(),
            namespace: namespace.to_string(),
            name: unit.name().to_string(),
            labels: unit.labels().clone(),
            status: UnitStatus::new(UnitPhase::Pending),
        };
        state.units.insert(
            key,
            StoredUnit {
                descriptor: unit.clone(),
                snapshot: snapshot.clone(),
            },
        );
        state.broadcast(WatchEvent {
            event_type: WatchEventType::Added,
            unit: snapshot.clone(),
        });

        Ok(snapshot)
    }

    async fn delete_unit(&self, namespace: &str, name: &str) -> Result<(), ControlPlaneError> {
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Delete {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });

        if let Some(error) = state.delete_failures.remove(name) {
            return Err(error);
        }

        let stored = state
            .units
            .remove(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ControlPlaneError::NotFound(name.to_string()))?;
        state.broadcast(WatchEvent {
            event_type: WatchEventType::Deleted,
            unit: stored.snapshot,
        });

        Ok(())
    }

    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<WatchStream, ControlPlaneError> {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Watch {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
        });
        state.watchers.push(Watcher {
            namespace: namespace.to_string(),
            selector: selector.clone(),
            tx,
        });

        Ok(rx.boxed())
    }
}
