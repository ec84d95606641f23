//! Cluster-legal names and identities
//!
//! Everything that ends up in a pod name or a label value goes through
//! [`sanitize`] or [`step_identity`] first.

use md5::{Digest, Md5};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Lower-case `name` and replace every character outside `[a-z0-9-.]` with `-`
///
/// Total and idempotent, but not injective: `"Build App"` and `"build_app"`
/// both become `"build-app"`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '.' => c,
            _ => '-',
        })
        .collect()
}

/// Stable identity of a step name, used as a label value and gate selector
///
/// Hex-encoded MD5 of the raw (unsanitized) name. Only needs to be stable,
/// not collision resistant against an adversary.
pub fn step_identity(step_name: &str) -> String {
    hex::encode(Md5::digest(step_name.as_bytes()))
}

/// Identifier of one run of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wrap an already cluster-legal identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Run id from arbitrary input, made cluster-legal with [`sanitize`]
    pub fn sanitized(id: &str) -> Self {
        Self(sanitize(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the unit that runs `step_name` within this run
    pub fn unit_name(&self, step_name: &str) -> String {
        format!("{}-{}", self.0, sanitize(step_name))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates run identifiers for pipelines
pub trait RunIdGenerator: Send + Sync {
    fn generate(&self, pipeline_name: &str) -> RunId;
}

/// `sanitize(name)-<8 random hex chars>`; uniqueness is probabilistic
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomRunIds;

impl RunIdGenerator for RandomRunIds {
    fn generate(&self, pipeline_name: &str) -> RunId {
        let mut bytes = [0u8; 4];
        rand::rng().fill(&mut bytes);
        RunId(format!("{}-{}", sanitize(pipeline_name), hex::encode(bytes)))
    }
}

/// Predictable run ids (`name-00000001`, `name-00000002`, ...) for tests
#[derive(Debug, Clone, Default)]
pub struct SequentialRunIds {
    counter: Arc<AtomicU32>,
}

impl SequentialRunIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunIdGenerator for SequentialRunIds {
    fn generate(&self, pipeline_name: &str) -> RunId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        RunId(format!("{}-{:08x}", sanitize(pipeline_name), n))
    }
}
