//! Memory Manager - garbage-collected heap, shapes and objects
//!
//! This component provides:
//! - Cells: typed values stored in fixed-size heap slots, each with a
//!   static vtable for tracing, finalization and drop
//! - Heap blocks with a free list, a lazy allocation cursor and an atomic
//!   mark bitmap, grouped into size-class allocators
//! - A stop-the-world mark/sweep [`Heap`] with optional parallel marking,
//!   root handles, conservative root vectors, defer scopes and post-collection
//!   tasks
//! - Shapes (hidden classes) with weak transition caches, dictionary mode and
//!   prototype-chain validity tracking
//! - [`Object`]: a shape plus property storage
//!
//! # Examples
//!
//! ```
//! use core_types::Value;
//! use memory_manager::{CollectionType, Heap, Object, PropertyKey, Shape, ShapeConfig};
//!
//! let heap = Heap::new();
//! let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
//!
//! let a = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
//! let b = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
//! a.put(&heap, PropertyKey::from("x"), Value::from_i32(1)).unwrap();
//! b.put(&heap, PropertyKey::from("x"), Value::from_i32(2)).unwrap();
//! assert_eq!(a.shape(), b.shape());
//!
//! heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
//! assert_eq!(b.get(&PropertyKey::from("x")), Some(Value::from_i32(2)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod cell_allocator;
pub mod config;
pub mod heap;
pub mod heap_block;
mod marking;
pub mod object;
pub mod property;
pub mod prototype_chain_validity;
pub mod root;
pub mod shape;

pub use cell::{Cell, CellPtr, CellState, GcRef, Visitor, Weak};
pub use cell_allocator::AllocatorStatistics;
pub use config::{HeapConfig, ShapeConfig, GC_MIN_BYTES_THRESHOLD};
pub use heap::{CollectionReport, CollectionType, DeferGc, GcPhase, Heap};
pub use heap_block::{HeapBlock, MarkBitmap, BLOCK_SIZE, MAX_CELL_SIZE, MIN_CELL_SIZE};
pub use marking::MarkingSummary;
pub use object::Object;
pub use property::{PropertyAttributes, PropertyKey, PropertyMetadata};
pub use prototype_chain_validity::PrototypeChainValidity;
pub use root::{ConservativeVector, HeapRootKind, Root, RootProvider};
pub use shape::{PropertyTable, Shape, TransitionType};
