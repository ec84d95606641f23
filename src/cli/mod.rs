//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{RenderCommand, ValidateCommand};
use std::ffi::OsString;

/// Schedules CI pipelines as pods on a cluster
#[derive(Debug, Parser, Clone)]
#[command(name = "mason")]
#[command(version = "0.1.0")]
#[command(about = "Schedule CI pipelines as pods and track their runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to scheduler configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Print the units a pipeline would be scheduled as
    Render(RenderCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
