//! Pipeline domain model

use crate::core::{config::PipelineConfig, error::ValidationError, step::Step};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Pipeline steps, in declaration order
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Pipeline {
            name: config.name.clone(),
            steps: config.steps.iter().map(Step::from_config).collect(),
        }
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Effective dependencies of the step at `index`
    ///
    /// Explicit `depends_on` wins (duplicates dropped, order kept); otherwise
    /// the step depends on its predecessor, and the first step on nothing.
    pub fn dependencies_of(&self, index: usize) -> Vec<String> {
        let Some(step) = self.steps.get(index) else {
            return Vec::new();
        };

        match &step.depends_on {
            Some(explicit) => {
                let mut seen = HashSet::new();
                explicit
                    .iter()
                    .filter(|dep| seen.insert(dep.as_str()))
                    .cloned()
                    .collect()
            }
            None if index > 0 => vec![self.steps[index - 1].name.clone()],
            None => Vec::new(),
        }
    }

    /// Store the effective dependencies back onto every step
    ///
    /// Idempotent: a resolved pipeline resolves to itself.
    pub fn resolve_dependencies(&mut self) {
        let resolved: Vec<Vec<String>> = (0..self.steps.len())
            .map(|i| self.dependencies_of(i))
            .collect();
        for (step, deps) in self.steps.iter_mut().zip(resolved) {
            step.depends_on = Some(deps);
        }
    }

    /// Check the pipeline can be translated into units
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptyPipeline {
                pipeline: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.is_empty() {
                return Err(ValidationError::EmptyStepName {
                    pipeline: self.name.clone(),
                    index,
                });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(ValidationError::DuplicateStep {
                    pipeline: self.name.clone(),
                    step: step.name.clone(),
                });
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            for dep in self.dependencies_of(index) {
                if !seen.contains(dep.as_str()) {
                    return Err(ValidationError::DanglingDependency {
                        step: step.name.clone(),
                        dependency: dep,
                    });
                }
            }
        }

        Ok(())
    }

    /// Reject dependency cycles, which would leave gates waiting on each other
    pub fn check_cycles(&self) -> Result<(), ValidationError> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for step in &self.steps {
            if !visited.contains(step.name.as_str()) {
                self.dfs_check(&step.name, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check<'a>(
        &'a self,
        step_name: &'a str,
        visited: &mut HashSet<&'a str>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<(), ValidationError> {
        visited.insert(step_name);
        recursion_stack.insert(step_name.to_string());

        if let Some(index) = self.steps.iter().position(|s| s.name == step_name) {
            for dep in self.dependencies_of(index) {
                if recursion_stack.contains(&dep) {
                    return Err(ValidationError::DependencyCycle { step: dep });
                }
                if let Some(dep_step) = self.step(&dep) {
                    if !visited.contains(dep_step.name.as_str()) {
                        self.dfs_check(&dep_step.name, visited, recursion_stack)?;
                    }
                }
            }
        }

        recursion_stack.remove(step_name);
        Ok(())
    }
}
