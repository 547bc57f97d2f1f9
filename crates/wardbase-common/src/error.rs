//! Error types for wardbase

use thiserror::Error;

/// Result type alias for wardbase operations
pub type Result<T> = std::result::Result<T, WardbaseError>;

/// Main error type shared across the workspace
#[derive(Error, Debug)]
pub enum WardbaseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
