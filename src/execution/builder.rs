//! Pipeline to unit translation
//!
//! One unit per step. A step's dependencies become gate (init) containers
//! that block until the pod of the dependency, found by label selector, is
//! ready; the gate image owns the waiting and its timeout. The unit itself
//! does not order anything.

use crate::cluster::unit::{
    ClaimSource, Container, RestartPolicy, UnitDescriptor, UnitMetadata, UnitSpec, Volume,
    VolumeMount,
};
use crate::core::config::SchedulerConfig;
use crate::core::labels::{unit_labels, LabelSelector};
use crate::core::{Pipeline, RunId, Step, ValidationError};
use std::collections::BTreeMap;

/// Annotation carrying the step's unsanitized name
pub const STEP_NAME_ANNOTATION: &str = "io.crafto.mason/step-name";

/// Name of the shared workspace volume inside each unit
pub const WORKSPACE_VOLUME: &str = "workspace";

/// Name of the container running the step's commands
pub const WORK_CONTAINER: &str = "step";

/// Translates pipelines into unit descriptors
#[derive(Debug, Clone, Default)]
pub struct UnitBuilder {
    config: SchedulerConfig,
}

impl UnitBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build one unit per step, in step order
    ///
    /// Pure: the same pipeline and run id always give the same descriptors.
    pub fn build_units(
        &self,
        pipeline: &Pipeline,
        run_id: &RunId,
    ) -> Result<Vec<UnitDescriptor>, ValidationError> {
        pipeline.validate()?;

        Ok(pipeline
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.build_unit(step, &pipeline.dependencies_of(index), run_id))
            .collect())
    }

    fn build_unit(&self, step: &Step, dependencies: &[String], run_id: &RunId) -> UnitDescriptor {
        let mut annotations = BTreeMap::new();
        annotations.insert(STEP_NAME_ANNOTATION.to_string(), step.name.clone());

        UnitDescriptor {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            metadata: UnitMetadata {
                namespace: self.config.namespace.clone(),
                name: run_id.unit_name(&step.name),
                labels: unit_labels(run_id, &step.name),
                annotations,
            },
            spec: UnitSpec {
                service_account_name: self.config.service_account.clone(),
                init_containers: dependencies
                    .iter()
                    .enumerate()
                    .map(|(i, dep)| self.gate_container(i, dep, run_id))
                    .collect(),
                containers: vec![self.work_container(step, run_id)],
                volumes: vec![Volume {
                    name: WORKSPACE_VOLUME.to_string(),
                    persistent_volume_claim: ClaimSource {
                        claim_name: self.config.workspace.claim_name.clone(),
                    },
                }],
                restart_policy: RestartPolicy::Never,
            },
        }
    }

    /// Blocks until the unit of `dependency` in the same run is ready
    fn gate_container(&self, index: usize, dependency: &str, run_id: &RunId) -> Container {
        let selector = LabelSelector::for_step(run_id, dependency);
        Container {
            name: format!("wait-{}", index),
            image: self.config.gate_image.clone(),
            image_pull_policy: self.config.image_pull_policy,
            command: Vec::new(),
            args: vec!["pod".to_string(), format!("-l{}", selector)],
            volume_mounts: Vec::new(),
        }
    }

    fn work_container(&self, step: &Step, run_id: &RunId) -> Container {
        Container {
            name: WORK_CONTAINER.to_string(),
            image: step.image.clone(),
            image_pull_policy: self.config.image_pull_policy,
            command: vec![self.config.shell.clone()],
            args: vec!["-c".to_string(), step.script()],
            // Runs share one claim; the run id subpath keeps them apart
            volume_mounts: vec![VolumeMount {
                name: WORKSPACE_VOLUME.to_string(),
                mount_path: self.config.workspace.mount_path.clone(),
                sub_path: Some(run_id.to_string()),
            }],
        }
    }
}
