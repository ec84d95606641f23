//! Feeds a watch stream into a pipeline run

use crate::cluster::{WatchEventType, WatchStream};
use crate::core::RunEvent;
use crate::execution::run::PipelineRun;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a task that applies `stream` to `run` and forwards transitions to `events`
pub fn spawn(
    run: Arc<Mutex<PipelineRun>>,
    stream: WatchStream,
    events: mpsc::UnboundedSender<RunEvent>,
) -> JoinHandle<()> {
    tokio::spawn(drive(run, stream, events))
}

/// Apply the statuses `run` was created with, then `MODIFIED` events from
/// `stream`, until the run completes or the stream ends
///
/// This is the only writer of the run. Each event is applied and its
/// transitions sent while holding the run lock, so observers see them in order.
pub async fn drive(
    run: Arc<Mutex<PipelineRun>>,
    mut stream: WatchStream,
    events: mpsc::UnboundedSender<RunEvent>,
) {
    {
        let mut run = run.lock().await;
        for transition in run.evaluate() {
            let _ = events.send(transition);
        }
        if run.is_completed() {
            debug!("run {} completed at creation, closing watch", run.run_id());
            return;
        }
    }

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                let run = run.lock().await;
                error!("watch for run {} failed: {}", run.run_id(), e);
                return;
            }
        };

        if event.event_type != WatchEventType::Modified {
            continue;
        }

        let mut run = run.lock().await;
        for transition in run.update_unit(&event.unit).into_events() {
            // Nobody listening is fine; the run state is still updated
            let _ = events.send(transition);
        }

        if run.is_completed() {
            debug!("run {} completed, closing watch", run.run_id());
            return;
        }
    }

    let run = run.lock().await;
    if !run.is_completed() {
        error!(
            "watch for run {} ended before completion (phase {})",
            run.run_id(),
            run.phase()
        );
    }
}
