//! Error types for cascadefix
//!
//! Resolver-internal faults are represented here so the adapters can use
//! `?` internally; the cascade itself contains them and degrades to
//! "no solution" instead of surfacing them to callers.

use thiserror::Error;

/// Main error type for the resolution subsystem
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Knowledge store errors (unreadable corpus, refused append)
    #[error("Knowledge store error: {0}")]
    Store(String),

    /// Documentation source errors
    #[error("Documentation source unavailable: {0}")]
    DocSource(String),

    /// Invalid glob handed to the knowledge store
    #[error("Invalid file pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Malformed document front matter
    #[error("Metadata parse error: {0}")]
    Metadata(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("Resolver error: {0}")]
    Generic(String),
}

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Convert anyhow errors to ResolverError
impl From<anyhow::Error> for ResolverError {
    fn from(err: anyhow::Error) -> Self {
        ResolverError::Generic(err.to_string())
    }
}
