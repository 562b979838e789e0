//! Shared validity flag for cached prototype-chain lookups.

use crate::cell::Cell;
use std::cell::Cell as Mutable;

/// A flag shared by every lookup cached against one prototype chain.
///
/// Caches hold the flag weakly and check it on every hit. When a shape on
/// the chain changes, the flag is cleared once and the owning shape gets a
/// fresh one, which invalidates every dependent entry without visiting it.
#[derive(Debug)]
pub struct PrototypeChainValidity {
    valid: Mutable<bool>,
}

impl PrototypeChainValidity {
    /// Creates a valid flag.
    pub fn new() -> Self {
        PrototypeChainValidity {
            valid: Mutable::new(true),
        }
    }

    /// Whether lookups cached against this chain may still be used.
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Invalidates the chain. There is no way back.
    pub fn set_invalid(&self) {
        self.valid.set(false);
    }
}

impl Default for PrototypeChainValidity {
    fn default() -> Self {
        Self::new()
    }
}

impl Cell for PrototypeChainValidity {
    fn class_name(&self) -> &'static str {
        "PrototypeChainValidity"
    }
}
