//! Error types for evform-core.

use thiserror::Error;

/// Result type alias for evform operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for evform operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No planes were configured for matching.
    #[error("at least one plane must be tracked")]
    NoPlanes,

    /// More planes than output dimensions.
    #[error("at most {max} planes can be tracked, got {got}")]
    TooManyPlanes { max: usize, got: usize },

    /// The same plane id was listed twice.
    #[error("plane {0} listed more than once")]
    DuplicatePlane(u8),

    /// A parameter is outside its valid range.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}
