//! CLI-specific error types and exit code mapping

use logsift_core::error::LogsiftError;
use logsift_log_pipeline::LogPipelineError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading, validation or override failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Rule compilation or processing failure.
    #[error("engine error: {0}")]
    Engine(#[from] LogPipelineError),

    /// JSON serialisation failed during report rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped non-configuration error from logsift-core.
    #[error("{0}")]
    Core(LogsiftError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                      |
    /// |------|------------------------------|
    /// | 0    | Success                      |
    /// | 1    | Engine / core error          |
    /// | 2    | Configuration error          |
    /// | 10   | IO error                     |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Engine(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}

impl From<LogsiftError> for CliError {
    fn from(e: LogsiftError) -> Self {
        match e {
            LogsiftError::Config(e) => Self::Config(e.to_string()),
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_core::error::ConfigError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_engine_error() {
        let err = CliError::from(LogPipelineError::UnknownChain("main".to_owned()));
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("main"));
    }

    #[test]
    fn test_core_config_error_maps_to_config() {
        let core = LogsiftError::Config(ConfigError::FileNotFound {
            path: "logsift.yaml".to_owned(),
        });
        let err = CliError::from(core);
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_core_io_error_stays_core() {
        let core = LogsiftError::Io(std::io::Error::other("disk"));
        let err = CliError::from(core);
        assert!(matches!(err, CliError::Core(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_error_display_config() {
        let err = CliError::Config("invalid YAML syntax".to_owned());
        let display_str = err.to_string();
        assert!(display_str.contains("configuration error"));
        assert!(display_str.contains("invalid YAML syntax"));
    }
}
