//! Bytecode system for JavaScript runtime
//!
//! This crate provides the compiled form of a function or script: the
//! [`Executable`] heap cell, the operand addressing scheme its instructions
//! use, and the per-callsite caches the interpreter fills in while running
//! it.
//!
//! # Features
//!
//! - Operand space partitioned into registers, locals, constants and
//!   arguments
//! - Interned identifier, string and property-key tables
//! - Exception handler and source map tables with binary-search lookup
//! - Polymorphic property lookup caches, global variable caches, object
//!   shape caches and template object caches, pre-sized per executable
//!
//! # Example
//!
//! ```
//! use bytecode_system::{ExecutableBuilder, Operand, OperandKind};
//! use memory_manager::Heap;
//!
//! let heap = Heap::new();
//! let mut builder = ExecutableBuilder::new("script");
//! builder.set_register_count(4);
//! builder.add_local_variable("total").unwrap();
//! builder.set_argument_count(2);
//! builder.set_bytecode(vec![0; 16]);
//! builder.add_exception_handler(0, 8, Some(12), None);
//!
//! let executable = builder.build(&heap).unwrap();
//! assert_eq!(executable.classify_operand(Operand::new(4)), OperandKind::Local(0));
//! assert_eq!(executable.classify_operand(Operand::new(6)), OperandKind::Argument(1));
//! assert!(executable.exception_handlers_for_offset(10).is_none());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod caches;
pub mod exception_handler;
pub mod executable;
mod offset_table;
pub mod operand;
pub mod source_map;

pub use builder::ExecutableBuilder;
pub use caches::{
    CachedProperty, GlobalVariableCache, ObjectShapeCache, PropertyLookupCache, PropertyLookupCacheEntry,
    TemplateObjectCache, POLYMORPHIC_ENTRY_COUNT,
};
pub use exception_handler::ExceptionHandlers;
pub use executable::{Executable, RegexLiteral};
pub use offset_table::OffsetRange;
pub use operand::{Operand, OperandKind, OperandLayout, MAX_OPERAND_INDEX};
pub use source_map::{SourceMapEntry, SourcePosition, SourceRange};
