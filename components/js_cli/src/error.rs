//! Error types for the CLI

use core_types::RuntimeError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Runtime failure: exhaustion, bad configuration, malformed executable
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// File I/O error
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A collection was requested while collection was deferred
    #[error("collection was deferred")]
    CollectionDeferred,

    /// Workload arguments the runtime cannot run
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
