//! CLI output formatting

use crate::cluster::UnitDescriptor;
use crate::core::Pipeline;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");

/// One line per step: name, image and what it waits for
pub fn format_steps(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let deps = pipeline.dependencies_of(i);
            let after = if deps.is_empty() {
                String::new()
            } else {
                format!(" ← {}", style(deps.join(", ")).dim())
            };
            format!("{} ({}){}", style(&step.name).cyan(), step.image, after)
        })
        .collect()
}

/// Render descriptors as a multi-document YAML stream
pub fn format_units_yaml(units: &[UnitDescriptor]) -> Result<String, serde_yaml::Error> {
    let documents = units
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents.join("---\n"))
}
