//! Runtime configuration: heap, shape and cache tunables in one document.

use core_types::{RuntimeError, RuntimeResult};
use memory_manager::{HeapConfig, ShapeConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Geometry of the megamorphic property cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of cache lines per table; a power of two.
    pub table_size: usize,
    /// Entries in each cache line.
    pub entries_per_line: usize,
    /// Lines probed before evicting.
    pub max_probe: usize,
    /// Mixed into the hash of the get table.
    pub get_salt: u64,
    /// Mixed into the hash of the put table.
    pub put_salt: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            table_size: 1024,
            entries_per_line: 4,
            max_probe: 4,
            get_salt: 0x9e37_79b9_7f4a_7c15,
            put_salt: 0xc2b2_ae3d_27d4_eb4f,
        }
    }
}

impl CacheConfig {
    /// Checks the table geometry.
    pub fn validate(&self) -> RuntimeResult<()> {
        if !self.table_size.is_power_of_two() {
            return Err(invalid(format!("table_size {} is not a power of two", self.table_size)));
        }
        if self.entries_per_line == 0 {
            return Err(invalid("entries_per_line must be at least 1"));
        }
        if self.max_probe == 0 {
            return Err(invalid("max_probe must be at least 1"));
        }
        if self.max_probe > self.table_size {
            return Err(invalid(format!(
                "max_probe {} exceeds table_size {}",
                self.max_probe, self.table_size
            )));
        }
        if self.table_size.checked_mul(self.entries_per_line).is_none() {
            return Err(invalid("table_size * entries_per_line overflows"));
        }
        Ok(())
    }
}

/// Everything a [`VM`](crate::VM) is configured with.
///
/// # Example
///
/// ```
/// use interpreter::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json_str(r#"{ "cache": { "table_size": 64 } }"#).unwrap();
/// assert_eq!(config.cache.table_size, 64);
/// assert_eq!(config.cache.entries_per_line, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap tunables
    pub heap: HeapConfig,
    /// Dictionary promotion thresholds
    pub shapes: ShapeConfig,
    /// Megamorphic cache geometry
    pub cache: CacheConfig,
}

impl RuntimeConfig {
    /// Validates every section.
    pub fn validate(&self) -> RuntimeResult<()> {
        self.heap.validate()?;
        self.shapes.validate()?;
        self.cache.validate()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> RuntimeResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|error| invalid(format!("malformed configuration: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|error| invalid(format!("cannot read {}: {error}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Pretty-printed JSON form.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|error| unreachable!("configuration serializes: {error}"))
    }
}

fn invalid(message: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidConfig(message.into())
}
