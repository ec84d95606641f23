//! Scheduler - turns pipelines into units on the cluster and tracks the runs

use crate::cluster::{ControlPlane, ControlPlaneError, UnitDescriptor, UnitSnapshot};
use crate::core::config::{ScheduleRequest, SchedulerConfig};
use crate::core::{LabelSelector, Pipeline, RandomRunIds, RunEvent, RunId, RunIdGenerator, RunPhase, ValidationError};
use crate::execution::builder::UnitBuilder;
use crate::execution::run::{PipelineRun, TrackedUnit};
use crate::execution::watch;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Why a pipeline could not be scheduled
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid pipeline: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to create unit '{unit}': {source}")]
    Submission {
        unit: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("failed to watch run '{run_id}': {source}")]
    Watch {
        run_id: RunId,
        #[source]
        source: ControlPlaneError,
    },
}

/// A scheduled run: its live state plus the stream of its transitions
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    run: Arc<Mutex<PipelineRun>>,
    events: mpsc::UnboundedReceiver<RunEvent>,
    watch: JoinHandle<()>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Copy of the run state as of now
    pub async fn snapshot(&self) -> PipelineRun {
        self.run.lock().await.clone()
    }

    /// Next transition, or `None` once the watch has ended and all were read
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Wait until the run succeeds or fails
    ///
    /// Returns `None` if the watch ends before the run completes.
    pub async fn wait_for_completion(&mut self) -> Option<RunPhase> {
        while let Some(event) = self.next_event().await {
            if let Some(phase) = event.phase().filter(|p| p.is_terminal()) {
                return Some(phase);
            }
        }

        let run = self.run.lock().await;
        run.is_completed().then(|| run.phase())
    }

    /// Whether the watch task has stopped
    pub fn is_watch_finished(&self) -> bool {
        self.watch.is_finished()
    }
}

/// Schedules pipelines onto a control plane
pub struct Scheduler<C, G = RandomRunIds> {
    control_plane: C,
    builder: UnitBuilder,
    run_ids: G,
}

impl<C: ControlPlane> Scheduler<C> {
    pub fn new(control_plane: C, config: SchedulerConfig) -> Self {
        Self {
            control_plane,
            builder: UnitBuilder::new(config),
            run_ids: RandomRunIds,
        }
    }
}

impl<C: ControlPlane, G: RunIdGenerator> Scheduler<C, G> {
    /// Use a different run id generator
    pub fn with_run_ids<H: RunIdGenerator>(self, run_ids: H) -> Scheduler<C, H> {
        Scheduler {
            control_plane: self.control_plane,
            builder: self.builder,
            run_ids,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        self.builder.config()
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    /// Create every unit of `pipeline` and start tracking the run
    ///
    /// Returns once all units are accepted and the run's watch is
    /// established. Any failed creation fails the whole call.
    pub async fn schedule_pipeline(
        &self,
        mut pipeline: Pipeline,
        trigger_event: serde_json::Value,
    ) -> Result<RunHandle, ScheduleError> {
        pipeline.validate()?;
        pipeline.check_cycles()?;
        pipeline.resolve_dependencies();

        let run_id = self.run_ids.generate(&pipeline.name);
        let units = self.builder.build_units(&pipeline, &run_id)?;
        let namespace = self.config().namespace.as_str();

        // Subscribe first so status changes racing the creation are not lost
        let stream = self
            .control_plane
            .watch(namespace, &LabelSelector::for_run(&run_id))
            .await
            .map_err(|source| ScheduleError::Watch {
                run_id: run_id.clone(),
                source,
            })?;

        let created = self.submit_units(namespace, &units).await?;
        info!(
            "scheduled pipeline {} as run {} ({} units)",
            pipeline.name,
            run_id,
            created.len()
        );

        let tracked = pipeline
            .steps
            .iter()
            .zip(created)
            .map(|(step, unit)| TrackedUnit::new(step.name.clone(), unit))
            .collect();
        let run = Arc::new(Mutex::new(PipelineRun::new(
            pipeline,
            trigger_event,
            run_id.clone(),
            tracked,
        )));

        let (tx, rx) = mpsc::unbounded_channel();
        let watch = watch::spawn(run.clone(), stream, tx);

        Ok(RunHandle {
            run_id,
            run,
            events: rx,
            watch,
        })
    }

    /// Schedule every pipeline of a request concurrently
    ///
    /// One result per pipeline, in request order; a failing pipeline does
    /// not affect the others.
    pub async fn schedule_request(
        &self,
        request: ScheduleRequest,
    ) -> Vec<Result<RunHandle, ScheduleError>> {
        let ScheduleRequest {
            trigger_event,
            pipelines,
        } = request;

        join_all(
            pipelines
                .iter()
                .map(|config| self.schedule_pipeline(config.to_pipeline(), trigger_event.clone())),
        )
        .await
    }

    /// Create all units at once
    ///
    /// Waits for every request (rather than bailing on the first error) so
    /// that units created by a failed batch are known and can be removed.
    async fn submit_units(
        &self,
        namespace: &str,
        units: &[UnitDescriptor],
    ) -> Result<Vec<UnitSnapshot>, ScheduleError> {
        let results = join_all(
            units
                .iter()
                .map(|unit| self.control_plane.create_unit(namespace, unit)),
        )
        .await;

        let mut created = Vec::with_capacity(units.len());
        let mut failure = None;
        for (unit, result) in units.iter().zip(results) {
            match result {
                Ok(snapshot) => created.push(snapshot),
                Err(source) => {
                    error!("failed to create unit {}: {}", unit.name(), source);
                    failure.get_or_insert(ScheduleError::Submission {
                        unit: unit.name().to_string(),
                        source,
                    });
                }
            }
        }

        match failure {
            Some(err) => {
                self.remove_units(namespace, &created).await;
                Err(err)
            }
            None => Ok(created),
        }
    }

    /// Best-effort removal of units left behind by a failed submission
    async fn remove_units(&self, namespace: &str, units: &[UnitSnapshot]) {
        let results = join_all(
            units
                .iter()
                .map(|unit| self.control_plane.delete_unit(namespace, &unit.name)),
        )
        .await;

        for (unit, result) in units.iter().zip(results) {
            match result {
                Ok(()) => info!("removed unit {} after failed submission", unit.name),
                Err(e) => error!("failed to remove unit {}: {}", unit.name, e),
            }
        }
    }
}
