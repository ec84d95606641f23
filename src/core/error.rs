//! Pipeline validation errors

use thiserror::Error;

/// A pipeline that cannot be translated into units
///
/// Raised before any cluster interaction; never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pipeline '{pipeline}' has no steps")]
    EmptyPipeline { pipeline: String },

    #[error("pipeline '{pipeline}' has a step with an empty name at position {index}")]
    EmptyStepName { pipeline: String, index: usize },

    #[error("pipeline '{pipeline}' has more than one step named '{step}'")]
    DuplicateStep { pipeline: String, step: String },

    #[error("step '{step}' depends on non-existent step '{dependency}'")]
    DanglingDependency { step: String, dependency: String },

    #[error("cycle detected in dependency graph involving step '{step}'")]
    DependencyCycle { step: String },
}
