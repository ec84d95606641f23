//! Core domain models
//!
//! Pipelines and steps as submitted, the naming and label scheme that ties
//! units together on the cluster, and the phases a run moves through.

pub mod config;
pub mod error;
pub mod labels;
pub mod naming;
pub mod pipeline;
pub mod state;
pub mod step;

pub use error::ValidationError;
pub use labels::LabelSelector;
pub use naming::{sanitize, step_identity, RandomRunIds, RunId, RunIdGenerator, SequentialRunIds};
pub use pipeline::*;
pub use state::*;
pub use step::*;
