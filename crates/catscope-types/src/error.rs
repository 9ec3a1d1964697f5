//! Error types for catscope.

use thiserror::Error;

/// Main error type for catscope.
#[derive(Debug, Error)]
pub enum CatscopeError {
    /// Bad numeric code or letter given to a priority constructor
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    /// Filter pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Configuration not supported by this kind of filter
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Capture argument that would change the output format
    #[error("Reserved argument {0:?}: the output format is fixed to threadtime,epoch")]
    ReservedArgument(String),

    /// Capture process failed to start or exited unexpectedly
    #[error("Capture process fault: {0}")]
    ProcessFault(String),

    /// I/O error while reading the capture stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatscopeError>;
