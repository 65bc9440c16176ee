//! logsift -- one-shot batch analysis of distributed node logs.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use logsift_core::config::LogsiftConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = LogsiftConfig::load(&cli.config, cli.user_config.as_deref())
        .await
        .map_err(CliError::from)?;
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
        config.validate().map_err(CliError::from)?;
    }

    logging::init_tracing(&config.general)?;
    logsift_core::metrics::describe_all();

    tracing::info!(config = %cli.config.display(), "logsift starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, config).await?,
        Commands::Check => commands::check::execute(config, &writer).await?,
    }
    Ok(())
}
