//! CLI command definitions

use clap::Args;

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Render a pipeline as unit descriptors
#[derive(Debug, Args, Clone)]
pub struct RenderCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Run id to render with; random when omitted
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format instead of YAML
    #[arg(long)]
    pub json: bool,
}
