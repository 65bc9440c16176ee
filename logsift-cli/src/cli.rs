//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// logsift -- batch analysis of distributed node logs.
///
/// Use `logsift <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logsift", version, about, long_about = None)]
pub struct Cli {
    /// Path to the base YAML configuration document.
    #[arg(short, long, default_value = "logsift.yaml")]
    pub config: PathBuf,

    /// Optional user document deep-merged over the base configuration.
    #[arg(short, long, global = true)]
    pub user_config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format for reports.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process all input logs and write the aggregated outputs.
    Run(RunArgs),

    /// Compile the configuration and list the input files without reading them.
    Check,
}

/// Overrides applied on top of the loaded configuration for one run.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Ignore and do not update the incremental cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Number of files processed in parallel.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Override the output directory.
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,
}
