//! Integration test suite for the Corten heap runtime
//!
//! This crate provides integration tests that verify the heap, shapes,
//! executables and the VM work together across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use js_cli;
    pub use memory_manager;
}
