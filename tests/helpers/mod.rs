//! Shared fixtures for scheduler integration tests

#![allow(dead_code)]

use mason::cluster::InMemoryControlPlane;
use mason::core::config::{PipelineConfig, SchedulerConfig};
use mason::core::{Pipeline, RunEvent, RunPhase, SequentialRunIds, UnitPhase};
use mason::execution::{RunHandle, Scheduler};
use std::time::Duration;

pub const NAMESPACE: &str = "ci";

/// Scheduler over an in-memory control plane with predictable run ids
pub fn scheduler() -> Scheduler<InMemoryControlPlane, SequentialRunIds> {
    Scheduler::new(
        InMemoryControlPlane::new(),
        SchedulerConfig::new().with_namespace(NAMESPACE),
    )
    .with_run_ids(SequentialRunIds::new())
}

pub fn pipeline(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml).unwrap().to_pipeline()
}

/// Move a unit through `phases`, in order
pub fn drive(plane: &InMemoryControlPlane, unit: &str, phases: &[UnitPhase]) {
    for phase in phases {
        plane
            .set_phase(NAMESPACE, unit, *phase)
            .unwrap_or_else(|| panic!("no unit {}", unit));
    }
}

/// Wait for the run to finish, failing the test instead of hanging
pub async fn complete(handle: &mut RunHandle) -> Option<RunPhase> {
    tokio::time::timeout(Duration::from_secs(5), handle.wait_for_completion())
        .await
        .expect("run did not complete in time")
}

/// Read events until the watch closes or `n` events were received
pub async fn collect_events(handle: &mut RunHandle, n: usize) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while events.len() < n {
        match tokio::time::timeout(Duration::from_secs(5), handle.next_event()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => break,
            Err(_) => panic!("timed out after {} events", events.len()),
        }
    }
    events
}

/// Phases named by a sequence of run events; `None` for Completed
pub fn phases(events: &[RunEvent]) -> Vec<Option<RunPhase>> {
    events.iter().map(RunEvent::phase).collect()
}
