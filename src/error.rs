//! Error types for windowlimit.
//!
//! Admission itself never fails; every variant here is raised while building
//! or configuring a limiter.

use thiserror::Error;

/// Main error type for windowlimit operations.
#[derive(Error, Debug)]
pub enum WindowLimitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A quota of zero was requested
    #[error("Invalid quota: {0} (must be at least 1)")]
    InvalidQuota(u64),

    /// A window of zero length was requested
    #[error("Invalid window: {0:?} (must be longer than zero)")]
    InvalidWindow(std::time::Duration),

    /// Background tasks could not be started
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for WindowLimitError {
    fn from(err: config::ConfigError) -> Self {
        WindowLimitError::Config(err.to_string())
    }
}

/// Result type alias for windowlimit operations.
pub type Result<T> = std::result::Result<T, WindowLimitError>;
