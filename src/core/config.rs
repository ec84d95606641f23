//! Pipeline and scheduler configuration from YAML/JSON

use crate::cluster::unit::PullPolicy;
use crate::core::Pipeline;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline steps
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Step configuration as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within the pipeline
    pub name: String,

    /// Container image to run the commands in
    pub image: String,

    /// Commands, run in order by the step's shell
    #[serde(default)]
    pub commands: Vec<String>,

    /// Steps this step waits for; defaults to the previous step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML (or JSON) file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from a YAML string
    ///
    /// JSON is valid YAML, so this accepts both.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        let pipeline = self.to_pipeline();
        pipeline.validate()?;
        pipeline.check_cycles()?;
        Ok(())
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}

/// A batch of pipelines triggered by one event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// Whatever caused the schedule (a push, a tag, ...); carried through untouched
    #[serde(default)]
    pub trigger_event: serde_json::Value,

    pub pipelines: Vec<PipelineConfig>,
}

impl ScheduleRequest {
    /// Parse a request body (JSON or YAML)
    ///
    /// Pipelines are not validated here; each one is validated when it is
    /// scheduled so one bad pipeline does not reject its siblings.
    pub fn from_yaml(body: &str) -> Result<Self> {
        serde_yaml::from_str(body).context("Invalid schedule request")
    }
}

/// Where and how units are created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Namespace all units are created in
    pub namespace: String,

    /// Service account the units run as (cluster default when unset)
    pub service_account: Option<String>,

    /// Image of the gate containers that wait for dependencies
    pub gate_image: String,

    /// Shell that runs the step script with `-c`
    pub shell: String,

    /// Pull policy for both gate and step images
    pub image_pull_policy: PullPolicy,

    /// Shared workspace volume
    pub workspace: WorkspaceConfig,
}

/// Shared volume every run gets a subdirectory of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Persistent volume claim backing the workspace
    pub claim_name: String,

    /// Where the workspace is mounted in the step container
    pub mount_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            service_account: None,
            gate_image: "groundnuty/k8s-wait-for:v1.2".to_string(),
            shell: "/bin/bash".to_string(),
            image_pull_policy: PullPolicy::Always,
            workspace: WorkspaceConfig::default(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            claim_name: "mason-workspace".to_string(),
            mount_path: "/workspace".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load scheduler configuration from a YAML file; missing keys keep defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid scheduler configuration")
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_service_account(mut self, service_account: impl Into<String>) -> Self {
        self.service_account = Some(service_account.into());
        self
    }

    pub fn with_gate_image(mut self, image: impl Into<String>) -> Self {
        self.gate_image = image.into();
        self
    }

    pub fn with_workspace(mut self, claim_name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        self.workspace = WorkspaceConfig {
            claim_name: claim_name.into(),
            mount_path: mount_path.into(),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pipeline() {
        let yaml = r#"
name: "Test Pipeline"
steps:
  - name: "build"
    image: "rust:1"
    commands:
      - cargo build
  - name: "test"
    image: "rust:1"
    commands: ["cargo test"]
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, "Test Pipeline");
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.steps[1].depends_on, None);

        let pipeline = config.to_pipeline();
        assert_eq!(pipeline.steps[0].commands, vec!["cargo build"]);
    }

    #[test]
    fn test_parse_json_pipeline() {
        let json = r#"{"name": "p", "steps": [{"name": "a", "image": "alpine", "commands": ["true"], "depends_on": []}]}"#;
        let config = PipelineConfig::from_yaml(json).unwrap();
        assert_eq!(config.steps[0].depends_on, Some(vec![]));
    }

    #[test]
    fn test_duplicate_step_name_fails() {
        let yaml = r#"
name: "Test Pipeline"
steps:
  - name: "step1"
    image: "alpine"
  - name: "step1"
    image: "alpine"
"#;

        assert!(PipelineConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_dependency_fails() {
        let yaml = r#"
name: "Test Pipeline"
steps:
  - name: "step1"
    image: "alpine"
    depends_on: ["nonexistent"]
"#;

        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_cycle_fails() {
        let yaml = r#"
name: "Test Pipeline"
steps:
  - name: "a"
    image: "alpine"
    depends_on: ["b"]
  - name: "b"
    image: "alpine"
"#;

        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_empty_pipeline_fails() {
        assert!(PipelineConfig::from_yaml("name: nothing\n").is_err());
    }

    #[test]
    fn test_schedule_request() {
        let body = r#"{
            "triggerEvent": {"ref": "refs/heads/main"},
            "pipelines": [
                {"name": "ci", "steps": [{"name": "build", "image": "rust:1"}]},
                {"name": "broken", "steps": []}
            ]
        }"#;

        let request = ScheduleRequest::from_yaml(body).unwrap();
        assert_eq!(request.trigger_event["ref"], "refs/heads/main");
        assert_eq!(request.pipelines.len(), 2);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::from_yaml("namespace: ci\nservice_account: builder\n").unwrap();
        assert_eq!(config.namespace, "ci");
        assert_eq!(config.service_account.as_deref(), Some("builder"));
        assert_eq!(config.gate_image, "groundnuty/k8s-wait-for:v1.2");
        assert_eq!(config.workspace.mount_path, "/workspace");
        assert_eq!(config.image_pull_policy, PullPolicy::Always);
    }

    #[test]
    fn test_scheduler_config_builder() {
        let config = SchedulerConfig::new()
            .with_namespace("builds")
            .with_gate_image("wait-for:latest")
            .with_workspace("shared", "/src");

        assert_eq!(config.namespace, "builds");
        assert_eq!(config.gate_image, "wait-for:latest");
        assert_eq!(config.workspace.claim_name, "shared");
        assert_eq!(config.workspace.mount_path, "/src");
    }
}
