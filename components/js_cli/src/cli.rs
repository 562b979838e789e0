//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Corten heap driver: runs allocation, shape and cache workloads against
/// the managed-object runtime and reports what the collector saw.
#[derive(Parser, Debug)]
#[command(name = "corten-heap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON runtime configuration; missing fields take their defaults
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// What to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build objects through the VM, exercise the caches, collect and print
    /// the report
    Stress {
        /// Number of objects to create
        #[arg(short, long, default_value_t = 1000)]
        objects: usize,

        /// Properties per object
        #[arg(short, long, default_value_t = 8)]
        properties: usize,

        /// Collect before every allocation
        #[arg(long)]
        collect_every_allocation: bool,
    },

    /// Run a small workload and print the heap graph as JSON
    DumpGraph,

    /// Print the effective configuration as JSON
    Config,
}
