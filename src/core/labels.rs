//! Label scheme shared by units and their dependency gates
//!
//! The gate image resolves dependencies by listing pods with a selector built
//! here, so the keys and the rendered selector format must not change.

use crate::core::naming::{step_identity, RunId};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marks every unit created by mason
pub const GROUP_MARKER: &str = "io.crafto.mason";

/// Run the unit belongs to
pub const RUN_ID: &str = "io.crafto.mason/pipeline-run-id";

/// Identity hash of the step the unit executes
pub const STEP_IDENTITY: &str = "io.crafto.mason/step-id";

/// Labels as attached to a unit
pub type Labels = BTreeMap<String, String>;

/// Labels for the unit executing `step_name` in `run_id`
pub fn unit_labels(run_id: &RunId, step_name: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(GROUP_MARKER.to_string(), "true".to_string());
    labels.insert(RUN_ID.to_string(), run_id.to_string());
    labels.insert(STEP_IDENTITY.to_string(), step_identity(step_name));
    labels
}

/// Equality-based label selector (`k=v,k=v`)
///
/// Requirements keep their insertion order so the rendered form is stable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a `key=value` requirement
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.requirements.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.requirements.push((key, value)),
        }
        self
    }

    /// Every unit of a run
    pub fn for_run(run_id: &RunId) -> Self {
        Self::new()
            .with(GROUP_MARKER, "true")
            .with(RUN_ID, run_id.as_str())
    }

    /// The unit executing `step_name` in `run_id`
    pub fn for_step(run_id: &RunId, step_name: &str) -> Self {
        Self::for_run(run_id).with(STEP_IDENTITY, step_identity(step_name))
    }

    pub fn requirements(&self) -> &[(String, String)] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// True when every requirement is present in `labels` with the same value
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Error parsing a rendered selector
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid label selector requirement: '{0}'")]
pub struct SelectorParseError(pub String);

impl FromStr for LabelSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = LabelSelector::new();
        for requirement in s.split(',').filter(|r| !r.trim().is_empty()) {
            let (key, value) = requirement
                .split_once('=')
                .ok_or_else(|| SelectorParseError(requirement.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(SelectorParseError(requirement.to_string()));
            }
            selector = selector.with(key, value.trim());
        }
        Ok(selector)
    }
}
