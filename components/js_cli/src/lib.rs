//! Corten heap driver library
//!
//! Provides the [`Runtime`] workloads and supporting modules behind the
//! `corten-heap` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod runtime;

pub use cli::{Cli, Command};
pub use error::{CliError, CliResult};
pub use runtime::{Runtime, StressReport};
