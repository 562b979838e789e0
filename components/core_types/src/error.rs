//! Error types shared across the runtime.
//!
//! Only recoverable conditions are modelled here. Broken invariants (reading
//! a cell out of a non-cell value, classifying an operand past the argument
//! boundary, allocating mid-collection) panic at the point of detection.

use thiserror::Error;

/// A recoverable failure reported by the runtime.
///
/// # Examples
///
/// ```
/// use core_types::RuntimeError;
///
/// let error = RuntimeError::HeapExhausted { cell_size: 64 };
/// assert_eq!(
///     error.to_string(),
///     "heap exhausted: no free 64-byte cell after collection"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No cell could be handed out even after a collection and an attempt
    /// to acquire a fresh block.
    #[error("heap exhausted: no free {cell_size}-byte cell after collection")]
    HeapExhausted {
        /// Size class that ran dry
        cell_size: usize,
    },

    /// A cell payload does not fit into any configured size class.
    #[error("cell of {size} bytes exceeds the largest size class ({max} bytes)")]
    CellTooLarge {
        /// Requested slot size in bytes
        size: usize,
        /// Largest configured size class
        max: usize,
    },

    /// A configuration value failed validation or could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An executable handed over by the compiler breaks a layout rule.
    #[error("malformed executable: {0}")]
    MalformedExecutable(String),

    /// An operand index points past the last argument slot.
    #[error("operand index {index} is out of range (limit {limit})")]
    OperandOutOfRange {
        /// Raw operand index
        index: u32,
        /// Exclusive upper bound of the operand space
        limit: u32,
    },
}

/// Result alias used throughout the runtime.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
