//! Core value representation and error handling.
//!
//! This crate provides the foundational types shared by every other
//! component of the runtime.
//!
//! # Overview
//!
//! - [`Value`] - 64-bit NaN-boxed value holding a number, a primitive or a cell address
//! - [`CellTag`] - Which kind of heap cell a cell-valued [`Value`] points to
//! - [`RuntimeError`] - Recoverable failures reported by the runtime
//! - [`payload`] - Per-architecture recovery of a cell address from a boxed payload
//!
//! # Examples
//!
//! ```
//! use core_types::{CellTag, Value};
//!
//! let number = Value::from(42);
//! assert!(number.is_int32());
//! assert_eq!(number.as_double(), 42.0);
//!
//! let nan = Value::from(f64::NAN);
//! assert!(nan.is_nan());
//!
//! let cell = Value::from_cell_address(CellTag::Object, 0x1000);
//! assert!(cell.is_cell());
//! assert_eq!(cell.as_cell_address(), 0x1000);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
pub mod payload;
mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use value::{CellTag, Value};
