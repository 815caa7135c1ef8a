//! # Daylog
//!
//! A file logger for long-running processes with daily rotation.
//!
//! ## Features
//!
//! - Append-only file output, optionally mirrored to stdout
//! - Rotation exactly once per calendar day, driven by a background thread
//! - Size-triggered rotation
//! - Gzip compression of rotated files (`compress` feature, on by default)
//! - Optional bridge that routes `tracing` events into the same file
//!
//! ## Example
//!
//! ```rust,no_run
//! use daylog::{LoggerConfig, init_logging};
//!
//! let config = LoggerConfig::new("logs/server.log")
//!     .with_daily_rotate(true)
//!     .with_compress(true);
//! let logging = init_logging(&config)?;
//!
//! let logger = logging.logger();
//! daylog::daylog!(logger, "accepting connections on {}", "0.0.0.0:8080")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod clock;
pub mod compress;
pub mod config;
pub mod error;
pub mod init;
pub mod logger;
pub mod scheduler;
pub mod sink;

pub use builder::LoggerBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LoggerConfig;
pub use error::{Error, Result};
pub use init::{Logging, init_logging, init_logging_with_clock};
pub use logger::Logger;
pub use scheduler::{DailyRotationScheduler, RotationEvent};
pub use sink::{FileSink, RotatingSink};

/// Start configuring logging with a [`LoggerBuilder`].
pub fn builder() -> LoggerBuilder {
    LoggerBuilder::new()
}
