use thiserror::Error as ThisError;

/// Errors that can occur while setting up logging
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed (directory creation, opening the log file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Initialization failed.
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
