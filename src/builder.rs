//! Builder pattern for initializing the logging facility.
//!
//! # Example
//!
//! ```rust,no_run
//! let logging = daylog::builder()
//!     .with_path("/var/log/server/app.log")
//!     .with_daily_rotate(true)
//!     .with_compress(true)
//!     .init()
//!     .expect("Failed to initialize logging");
//!
//! logging.logger().log("server started").expect("write log");
//! ```

use crate::{LoggerConfig, Logging, Result, init_logging};
use std::path::PathBuf;
use std::time::Duration;

/// A builder for configuring and initializing logging.
#[derive(Debug, Clone, Default)]
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    /// Create a new LoggerBuilder with default configuration and no path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a LoggerBuilder from an existing configuration.
    pub fn from_config(config: LoggerConfig) -> Self {
        Self { config }
    }

    /// Set the log file path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_path(path);
        self
    }

    /// Gzip rotated files.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.config = self.config.with_compress(compress);
        self
    }

    /// Rotate the file once per calendar day.
    pub fn with_daily_rotate(mut self, daily_rotate: bool) -> Self {
        self.config = self.config.with_daily_rotate(daily_rotate);
        self
    }

    /// Mirror records to stdout.
    pub fn with_log_to_terminal(mut self, log_to_terminal: bool) -> Self {
        self.config = self.config.with_log_to_terminal(log_to_terminal);
        self
    }

    /// Rotate before the file grows past `max_size` bytes (0 disables).
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.config = self.config.with_max_size(max_size);
        self
    }

    /// How often the daily scheduler checks the date.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_poll_interval(interval);
        self
    }

    /// Get the current configuration without initializing.
    pub fn build(self) -> LoggerConfig {
        self.config
    }

    /// Initialize logging with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No path was set
    /// - The log directory or file cannot be created
    /// - The rotation scheduler cannot be started
    pub fn init(self) -> Result<Logging> {
        init_logging(&self.config)
    }
}
