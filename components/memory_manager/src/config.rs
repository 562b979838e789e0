//! Tunables for the heap and the shape system.

use crate::heap_block::{CELL_ALIGNMENT, MAX_CELL_SIZE, MIN_CELL_SIZE};
use core_types::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};

/// Default lower bound for the allocation volume between collections.
pub const GC_MIN_BYTES_THRESHOLD: usize = 4 * 1024 * 1024;

/// Heap configuration.
///
/// # Example
///
/// ```
/// use memory_manager::HeapConfig;
///
/// let config = HeapConfig {
///     marking_threads: 4,
///     ..HeapConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Cell slot sizes, one allocator each; strictly increasing.
    pub size_classes: Vec<usize>,
    /// Allocation volume that triggers the next collection, at minimum.
    pub gc_min_bytes_threshold: usize,
    /// Collect before every allocation (stress mode).
    pub collect_on_every_allocation: bool,
    /// Upper bound on blocks taken from the system allocator.
    pub max_blocks: Option<usize>,
    /// Threads used to trace the object graph; 1 marks on the caller.
    pub marking_threads: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            size_classes: vec![32, 64, 96, 128, 256, 512, 1024, 3072],
            gc_min_bytes_threshold: GC_MIN_BYTES_THRESHOLD,
            collect_on_every_allocation: false,
            max_blocks: None,
            marking_threads: 1,
        }
    }
}

impl HeapConfig {
    /// Checks the configuration for values the heap cannot work with.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.size_classes.is_empty() {
            return Err(invalid("size_classes must not be empty"));
        }
        for pair in self.size_classes.windows(2) {
            if pair[0] >= pair[1] {
                return Err(invalid("size_classes must be strictly increasing"));
            }
        }
        for &size in &self.size_classes {
            if size < MIN_CELL_SIZE || size > MAX_CELL_SIZE {
                return Err(invalid(format!(
                    "size class {size} outside {MIN_CELL_SIZE}..={MAX_CELL_SIZE}"
                )));
            }
            if size % CELL_ALIGNMENT != 0 {
                return Err(invalid(format!(
                    "size class {size} is not a multiple of {CELL_ALIGNMENT}"
                )));
            }
        }
        if self.marking_threads == 0 {
            return Err(invalid("marking_threads must be at least 1"));
        }
        if self.max_blocks == Some(0) {
            return Err(invalid("max_blocks must be at least 1"));
        }
        Ok(())
    }
}

/// When a shape stops sharing transitions and becomes a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Transition chain length at which further adds go to a dictionary.
    pub dictionary_depth_threshold: u32,
    /// Number of outgoing add transitions at which a shape stops branching.
    pub dictionary_fanout_threshold: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        ShapeConfig {
            dictionary_depth_threshold: 64,
            dictionary_fanout_threshold: 64,
        }
    }
}

impl ShapeConfig {
    /// Checks that both thresholds leave room for at least one transition.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.dictionary_depth_threshold == 0 {
            return Err(invalid("dictionary_depth_threshold must be at least 1"));
        }
        if self.dictionary_fanout_threshold == 0 {
            return Err(invalid("dictionary_fanout_threshold must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidConfig(message.into())
}
