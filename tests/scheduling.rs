//! Scheduling pipelines onto the in-memory control plane

mod helpers;

use async_trait::async_trait;
use helpers::*;
use mason::cluster::{
    ControlPlane, ControlPlaneCall, ControlPlaneError, InMemoryControlPlane, UnitDescriptor,
    UnitSnapshot, WatchStream,
};
use mason::core::config::{ScheduleRequest, SchedulerConfig};
use mason::core::labels::{LabelSelector, GROUP_MARKER, RUN_ID, STEP_IDENTITY};
use mason::core::{step_identity, SequentialRunIds, ValidationError};
use mason::execution::{ScheduleError, Scheduler};
use std::time::Duration;
use tokio::sync::Barrier;

const BUILD_AND_TEST: &str = r#"
name: "Build & Test"
steps:
  - name: Checkout
    image: alpine/git
    commands: ["git clone $REPO ."]
  - name: Build
    image: rust:1
    commands: ["cargo build"]
  - name: Unit Tests
    image: rust:1
    commands: ["cargo test --lib", "cargo test --doc"]
  - name: Lint
    image: rust:1
    depends_on: [Checkout]
    commands: ["cargo clippy"]
"#;

#[tokio::test]
async fn test_units_are_created_with_labels_and_gates() {
    let scheduler = scheduler();
    let handle = scheduler
        .schedule_pipeline(pipeline(BUILD_AND_TEST), serde_json::json!({"ref": "main"}))
        .await
        .unwrap();

    let run_id = handle.run_id().clone();
    assert_eq!(run_id.as_str(), "build---test-00000001");

    let plane = scheduler.control_plane();
    let names: Vec<String> = plane.units().into_iter().map(|u| u.name).collect();
    assert_eq!(
        names,
        vec![
            "build---test-00000001-build",
            "build---test-00000001-checkout",
            "build---test-00000001-lint",
            "build---test-00000001-unit-tests",
        ]
    );

    let tests = plane
        .descriptor(NAMESPACE, "build---test-00000001-unit-tests")
        .unwrap();
    assert_eq!(tests.labels()[GROUP_MARKER], "true");
    assert_eq!(tests.labels()[RUN_ID], run_id.as_str());
    assert_eq!(tests.labels()[STEP_IDENTITY], step_identity("Unit Tests"));
    assert_eq!(
        tests.work_container().unwrap().args,
        vec!["-c", "cargo test --lib && cargo test --doc"]
    );

    // Unit Tests waits on Build (implicit chain), Lint on Checkout (explicit)
    let build = plane.descriptor(NAMESPACE, "build---test-00000001-build").unwrap();
    let gate = tests.gates()[0].gate_selector().unwrap();
    assert_eq!(tests.gates().len(), 1);
    assert!(gate.matches(build.labels()));

    let lint = plane.descriptor(NAMESPACE, "build---test-00000001-lint").unwrap();
    let checkout = plane.descriptor(NAMESPACE, "build---test-00000001-checkout").unwrap();
    assert!(lint.gates()[0].gate_selector().unwrap().matches(checkout.labels()));

    let run = handle.snapshot().await;
    assert_eq!(run.trigger_event()["ref"], "main");
    assert_eq!(
        run.units().iter().map(|u| u.step_name.as_str()).collect::<Vec<_>>(),
        vec!["Checkout", "Build", "Unit Tests", "Lint"]
    );
}

#[tokio::test]
async fn test_watch_is_scoped_to_run_and_opened_first() {
    let scheduler = scheduler();
    let handle = scheduler
        .schedule_pipeline(pipeline(BUILD_AND_TEST), serde_json::Value::Null)
        .await
        .unwrap();

    let calls = scheduler.control_plane().calls();
    let expected = LabelSelector::for_run(handle.run_id()).to_string();
    assert_eq!(
        calls[0],
        ControlPlaneCall::Watch {
            namespace: NAMESPACE.to_string(),
            selector: expected,
        }
    );
    assert!(calls[1..]
        .iter()
        .all(|c| matches!(c, ControlPlaneCall::Create { .. })));
    assert_eq!(scheduler.control_plane().watcher_count(), 1);
}

#[tokio::test]
async fn test_invalid_pipeline_never_reaches_cluster() {
    let scheduler = scheduler();
    let mut bad = pipeline(BUILD_AND_TEST);
    bad.steps[1].name = bad.steps[0].name.clone();

    let err = scheduler
        .schedule_pipeline(bad, serde_json::Value::Null)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScheduleError::Validation(ValidationError::DuplicateStep { .. })
    ));
    assert!(scheduler.control_plane().calls().is_empty());
}

#[tokio::test]
async fn test_submission_failure_cleans_up_siblings() {
    let scheduler = scheduler();
    let plane = scheduler.control_plane();
    plane.fail_create(
        "build---test-00000001-lint",
        ControlPlaneError::Rejected("exceeded quota".to_string()),
    );

    let err = scheduler
        .schedule_pipeline(pipeline(BUILD_AND_TEST), serde_json::Value::Null)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to create unit 'build---test-00000001-lint': rejected: exceeded quota"
    );
    assert!(plane.units().is_empty());

    let deletes = plane
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ControlPlaneCall::Delete { .. }))
        .count();
    assert_eq!(deletes, 3);
}

#[tokio::test]
async fn test_failed_cleanup_leaves_unit_behind() {
    let scheduler = scheduler();
    let plane = scheduler.control_plane();
    plane.fail_create(
        "build---test-00000001-checkout",
        ControlPlaneError::Unavailable("connection refused".to_string()),
    );
    plane.fail_delete(
        "build---test-00000001-build",
        ControlPlaneError::Unavailable("connection refused".to_string()),
    );

    let err = scheduler
        .schedule_pipeline(pipeline(BUILD_AND_TEST), serde_json::Value::Null)
        .await
        .unwrap_err();

    match err {
        ScheduleError::Submission { unit, .. } => assert_eq!(unit, "build---test-00000001-checkout"),
        other => panic!("expected submission error, got {:?}", other),
    }
    let left: Vec<String> = plane.units().into_iter().map(|u| u.name).collect();
    assert_eq!(left, vec!["build---test-00000001-build"]);
}

#[tokio::test]
async fn test_schedule_request_isolates_bad_pipeline() {
    let request = ScheduleRequest::from_yaml(
        r#"
triggerEvent:
  kind: push
  sha: 4f2a9c1
pipelines:
  - name: docs
    steps:
      - name: build
        image: python:3
        commands: ["mkdocs build"]
  - name: broken
    steps:
      - name: deploy
        image: helm
        depends_on: [release]
  - name: app
    steps:
      - name: build
        image: rust:1
      - name: test
        image: rust:1
"#,
    )
    .unwrap();

    let scheduler = scheduler();
    let results = scheduler.schedule_request(request).await;

    assert_eq!(results.len(), 3);
    assert!(matches!(
        results[1],
        Err(ScheduleError::Validation(ValidationError::DanglingDependency { .. }))
    ));

    let docs = results[0].as_ref().unwrap();
    let app = results[2].as_ref().unwrap();
    assert!(docs.run_id().as_str().starts_with("docs-"));
    assert!(app.run_id().as_str().starts_with("app-"));
    assert_eq!(docs.snapshot().await.trigger_event()["sha"], "4f2a9c1");
    assert_eq!(scheduler.control_plane().units().len(), 3);
}

#[test]
fn test_scheduler_config_from_yaml() {
    let config = SchedulerConfig::from_yaml(
        r#"
namespace: builds
service_account: builder
workspace:
  claim_name: shared-ws
"#,
    )
    .unwrap();

    assert_eq!(config.namespace, "builds");
    assert_eq!(config.service_account.as_deref(), Some("builder"));
    assert_eq!(config.workspace.claim_name, "shared-ws");
    assert_eq!(config.workspace.mount_path, "/workspace");
    assert_eq!(config.gate_image, "groundnuty/k8s-wait-for:v1.2");
}

/// Holds every creation until `n` are in flight at once
struct BarrierControlPlane {
    inner: InMemoryControlPlane,
    barrier: Barrier,
}

#[async_trait]
impl ControlPlane for BarrierControlPlane {
    async fn create_unit(
        &self,
        namespace: &str,
        unit: &UnitDescriptor,
    ) -> Result<UnitSnapshot, ControlPlaneError> {
        self.barrier.wait().await;
        self.inner.create_unit(namespace, unit).await
    }

    async fn delete_unit(&self, namespace: &str, name: &str) -> Result<(), ControlPlaneError> {
        self.inner.delete_unit(namespace, name).await
    }

    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<WatchStream, ControlPlaneError> {
        self.inner.watch(namespace, selector).await
    }
}

#[tokio::test]
async fn test_units_are_submitted_concurrently() {
    let plane = BarrierControlPlane {
        inner: InMemoryControlPlane::new(),
        barrier: Barrier::new(4),
    };
    let scheduler = Scheduler::new(plane, SchedulerConfig::new().with_namespace(NAMESPACE))
        .with_run_ids(SequentialRunIds::new());

    let handle = tokio::time::timeout(
        Duration::from_secs(5),
        scheduler.schedule_pipeline(pipeline(BUILD_AND_TEST), serde_json::Value::Null),
    )
    .await
    .expect("creations were not issued concurrently")
    .unwrap();

    assert_eq!(handle.snapshot().await.units().len(), 4);
}
