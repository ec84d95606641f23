//! Step domain model

use crate::core::config::StepConfig;
use serde::{Deserialize, Serialize};

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, unique within its pipeline
    pub name: String,

    /// Container image the step runs in
    pub image: String,

    /// Shell commands, run in order; the first failure fails the step
    pub commands: Vec<String>,

    /// Names of the steps this one waits for
    ///
    /// `None` means "not specified": the step then depends on its predecessor.
    /// Filled in by [`Pipeline::resolve_dependencies`](crate::core::Pipeline::resolve_dependencies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

impl Step {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            commands: Vec::new(),
            depends_on: None,
        }
    }

    /// Append a command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// Set explicit dependencies (an empty list means "no dependencies")
    pub fn with_depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    /// Create a step from a step config
    pub fn from_config(config: &StepConfig) -> Self {
        Step {
            name: config.name.clone(),
            image: config.image.clone(),
            commands: config.commands.clone(),
            depends_on: config.depends_on.clone(),
        }
    }

    /// The shell script the work container runs: every command must succeed
    pub fn script(&self) -> String {
        self.commands.join(" && ")
    }
}
