//! Pipeline run state machine
//!
//! A [`PipelineRun`] is fed unit status snapshots and derives one phase for
//! the whole run:
//!
//! ```text
//! PENDING -> RUNNING            once any unit is observed Running
//! RUNNING -> SUCCEEDED          once every unit finished and none failed
//! RUNNING -> FAILED             once every unit finished and any failed
//! PENDING -> SUCCEEDED | FAILED when units finish before one is seen running
//! ```
//!
//! Transitions are returned from [`PipelineRun::update_unit`] in the order
//! they happened.

use crate::cluster::UnitSnapshot;
use crate::core::{FailedUnit, Pipeline, RunEvent, RunId, RunPhase, UnitPhase};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A unit belonging to a run, with its last reported status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedUnit {
    pub step_name: String,
    pub unit: UnitSnapshot,
}

impl TrackedUnit {
    pub fn new(step_name: impl Into<String>, unit: UnitSnapshot) -> Self {
        Self {
            step_name: step_name.into(),
            unit,
        }
    }

    pub fn phase(&self) -> UnitPhase {
        self.unit.status.phase
    }
}

/// What a status update did to the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitUpdate {
    /// No unit of this run has that uid; the run is untouched
    Unknown { uid: String, name: String },
    /// Same phase as last recorded; the snapshot was stored, nothing else changed
    Unchanged,
    /// The run already completed; unit statuses are frozen and the update was dropped
    Frozen,
    /// The unit changed phase; `events` holds any resulting run transitions
    Applied { events: Vec<RunEvent> },
}

impl UnitUpdate {
    pub fn events(&self) -> &[RunEvent] {
        match self {
            UnitUpdate::Applied { events } => events,
            _ => &[],
        }
    }

    pub fn into_events(self) -> Vec<RunEvent> {
        match self {
            UnitUpdate::Applied { events } => events,
            _ => Vec::new(),
        }
    }
}

/// Live state of one scheduled pipeline
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pipeline: Pipeline,
    trigger_event: serde_json::Value,
    run_id: RunId,
    units: Vec<TrackedUnit>,
    by_uid: HashMap<String, usize>,
    phase: RunPhase,
    completed: bool,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Start tracking `units`, which were just created for `pipeline`
    pub fn new(
        pipeline: Pipeline,
        trigger_event: serde_json::Value,
        run_id: RunId,
        units: Vec<TrackedUnit>,
    ) -> Self {
        let by_uid = units
            .iter()
            .enumerate()
            .map(|(i, tracked)| (tracked.unit.uid.clone(), i))
            .collect();

        Self {
            pipeline,
            trigger_event,
            run_id,
            units,
            by_uid,
            phase: RunPhase::Pending,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn trigger_event(&self) -> &serde_json::Value {
        &self.trigger_event
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn units(&self) -> &[TrackedUnit] {
        &self.units
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Number of units currently in `phase`
    pub fn count(&self, phase: UnitPhase) -> usize {
        self.units.iter().filter(|u| u.phase() == phase).count()
    }

    /// Units that finished in the Failed phase, in step order
    pub fn failed_units(&self) -> Vec<FailedUnit> {
        self.units
            .iter()
            .filter(|u| u.phase() == UnitPhase::Failed)
            .map(|u| FailedUnit {
                uid: u.unit.uid.clone(),
                name: u.unit.name.clone(),
                step_name: u.step_name.clone(),
                message: u.unit.status.message.clone(),
            })
            .collect()
    }

    /// Apply a status snapshot reported for one of this run's units
    pub fn update_unit(&mut self, update: &UnitSnapshot) -> UnitUpdate {
        let Some(&index) = self.by_uid.get(&update.uid) else {
            warn!(
                "no such unit {} ({}) in run {}",
                update.name, update.uid, self.run_id
            );
            return UnitUpdate::Unknown {
                uid: update.uid.clone(),
                name: update.name.clone(),
            };
        };

        if self.completed {
            debug!(
                "run {} already completed, dropping update for {}",
                self.run_id, update.name
            );
            return UnitUpdate::Frozen;
        }

        let tracked = &mut self.units[index];
        let previous = tracked.phase();
        tracked.unit.status = update.status.clone();

        if previous == update.status.phase {
            let events = self.sync_phase();
            return if events.is_empty() {
                UnitUpdate::Unchanged
            } else {
                UnitUpdate::Applied { events }
            };
        }

        debug!(
            "run {}: unit {} {} -> {}",
            self.run_id, tracked.unit.name, previous, update.status.phase
        );

        UnitUpdate::Applied {
            events: self.sync_phase(),
        }
    }

    /// Apply the transition rule to the statuses recorded so far
    ///
    /// Units may already be running or finished when they are created, so
    /// this is run once before the first watch event. Repeated calls emit
    /// each transition at most once.
    pub fn evaluate(&mut self) -> Vec<RunEvent> {
        self.sync_phase()
    }

    fn sync_phase(&mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        if self.completed {
            return events;
        }

        if self.phase == RunPhase::Pending && self.count(UnitPhase::Running) > 0 {
            self.phase = RunPhase::Running;
            info!("run {} is running", self.run_id);
            events.push(RunEvent::Running {
                run_id: self.run_id.clone(),
            });
        }

        let finished = self.units.iter().filter(|u| u.phase().is_terminal()).count();
        if finished == self.units.len() {
            self.completed = true;
            self.completed_at = Some(Utc::now());
            events.push(RunEvent::Completed {
                run_id: self.run_id.clone(),
            });

            let failed_units = self.failed_units();
            if failed_units.is_empty() {
                self.phase = RunPhase::Succeeded;
                info!("run {} succeeded", self.run_id);
                events.push(RunEvent::Succeeded {
                    run_id: self.run_id.clone(),
                });
            } else {
                self.phase = RunPhase::Failed;
                info!(
                    "run {} failed: {} of {} units failed",
                    self.run_id,
                    failed_units.len(),
                    self.units.len()
                );
                events.push(RunEvent::Failed {
                    run_id: self.run_id.clone(),
                    failed_units,
                });
            }
        }

        events
    }
}
