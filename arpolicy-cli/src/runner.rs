//! CLI runner for common setup.
//!
//! Loads the configuration file and initializes logging so command handlers
//! don't repeat it.

use std::path::PathBuf;

use arpolicy::config::{config_file_path, ConfigFile};
use arpolicy::logging::{init_logging, split_log_path, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Keeps the log writer alive while the runner exists.
    logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Load config from `config_path` (or the default path) and start
    /// logging to the configured file.
    ///
    /// Log output never goes to stdout; commands print their own output
    /// there.
    pub fn new(config_path: Option<PathBuf>, debug: bool) -> Result<Self, CliError> {
        let config_path = config_path.unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let (log_dir, log_file) = split_log_path(&config.logging.file);
        let logging_guard = init_logging(&log_dir, &log_file, false, debug)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("ARPolicy v{}", env!("CARGO_PKG_VERSION"));
        info!(
            config = %self.config_path.display(),
            log = %self.logging_guard.path().display(),
            "ARPolicy CLI: {} command",
            command
        );
    }

    pub fn log_path(&self) -> &std::path::Path {
        self.logging_guard.path()
    }
}
