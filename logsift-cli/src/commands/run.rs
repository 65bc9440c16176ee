//! `logsift run` command handler

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use logsift_core::config::LogsiftConfig;
use logsift_log_pipeline::LogJob;

use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command.
///
/// Applies the command-line overrides, processes every input file and writes
/// the aggregated outputs. Console reports (counters, request summaries) go to stdout.
///
/// # Errors
///
/// Returns `CliError::Config` if an override makes the configuration invalid and
/// `CliError::Engine` if the rule chains fail to compile or an output cannot be written.
pub async fn execute(args: RunArgs, mut config: LogsiftConfig) -> Result<(), CliError> {
    apply_overrides(&mut config, &args)?;

    let started = Instant::now();
    let job = Arc::new(LogJob::compile(Arc::new(config))?);
    let data = Arc::clone(&job).execute().await?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    job.dump(&data, &mut handle)?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        output = %job.layout().directory().display(),
        "run finished"
    );
    Ok(())
}

/// Apply the `run` flags to the loaded configuration and re-validate it.
pub fn apply_overrides(config: &mut LogsiftConfig, args: &RunArgs) -> Result<(), CliError> {
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(workers) = args.workers {
        config.general.workers = workers;
    }
    if let Some(dir) = &args.output_dir {
        config.outputs.directory = dir.display().to_string();
    }
    config.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> LogsiftConfig {
        LogsiftConfig::parse(
            r#"
input_logs:
  - pattern: '\.log$'
chains:
  main: []
"#,
        )
        .unwrap()
    }

    #[test]
    fn overrides_are_applied() {
        let mut config = config();
        let args = RunArgs {
            no_cache: true,
            workers: Some(2),
            output_dir: Some(PathBuf::from("/tmp/out")),
        };
        apply_overrides(&mut config, &args).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.general.workers, 2);
        assert_eq!(config.outputs.directory, "/tmp/out");
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let mut config = config();
        let args = RunArgs {
            workers: Some(0),
            ..RunArgs::default()
        };
        let err = apply_overrides(&mut config, &args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = config();
        let workers = config.general.workers;
        apply_overrides(&mut config, &RunArgs::default()).unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.general.workers, workers);
    }
}
