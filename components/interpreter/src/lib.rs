//! Property access runtime for the JavaScript engine
//!
//! This crate provides the pieces the bytecode interpreter calls into when
//! it executes a property access:
//! - A megamorphic (key, shape) cache shared by every access site
//! - The [`VM`] context owning the heap, the cache and the root shape
//! - `get_by_id` / `put_by_id` / `get_global` fast paths that consult the
//!   site's inline cache, then the megamorphic cache, then the shape
//! - [`RuntimeConfig`]: heap, shape and cache tunables loaded from JSON
//!
//! # Example
//!
//! ```
//! use bytecode_system::ExecutableBuilder;
//! use core_types::Value;
//! use interpreter::VM;
//! use memory_manager::PropertyKey;
//!
//! let mut vm = VM::new();
//! let mut builder = ExecutableBuilder::new("main");
//! let site = builder.reserve_property_lookup_caches(1).unwrap() as usize;
//! let code = vm.heap().root(builder.build(vm.heap()).unwrap());
//!
//! let point = vm.heap().root(vm.create_object().unwrap());
//! point.put(vm.heap(), PropertyKey::from("x"), Value::from_i32(10)).unwrap();
//!
//! let x = PropertyKey::from("x");
//! assert_eq!(vm.get_by_id(&code, site, point.gc_ref(), &x).unwrap(), Value::from_i32(10));
//! assert_eq!(vm.get_by_id(&code, site, point.gc_ref(), &x).unwrap(), Value::from_i32(10));
//! assert_eq!(vm.access_statistics().site_cache_hits, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod megamorphic_cache;
pub mod property_access;
pub mod vm;

// Re-export main types at crate root
pub use config::{CacheConfig, RuntimeConfig};
pub use megamorphic_cache::{CacheTableStatistics, MegamorphicCache, MegamorphicCacheStatistics};
pub use vm::{AccessStatistics, VM};
