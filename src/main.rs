use anyhow::{Context, Result};
use mason::cli::commands::{RenderCommand, ValidateCommand};
use mason::cli::output::*;
use mason::cli::{Cli, Command};
use mason::core::config::{PipelineConfig, SchedulerConfig};
use mason::core::{RandomRunIds, RunId, RunIdGenerator};
use mason::execution::UnitBuilder;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Render(cmd) => render_pipeline(cmd, &cli)?,
    }

    Ok(())
}

fn scheduler_config(cli: &Cli) -> Result<SchedulerConfig> {
    match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("Failed to load scheduler config {}", path)),
        None => Ok(SchedulerConfig::default()),
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            let pipeline = config.to_pipeline();
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            for line in format_steps(&pipeline) {
                println!("    {}", line);
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn render_pipeline(cmd: &RenderCommand, cli: &Cli) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let pipeline = config.to_pipeline();
    let run_id = match &cmd.run_id {
        Some(id) => RunId::sanitized(id),
        None => RandomRunIds.generate(&pipeline.name),
    };
    debug!("rendering {} as run {}", pipeline.name, run_id);

    let units = UnitBuilder::new(scheduler_config(cli)?).build_units(&pipeline, &run_id)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&units)?);
    } else {
        print!("{}", format_units_yaml(&units)?);
    }

    Ok(())
}
