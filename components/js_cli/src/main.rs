//! Corten heap driver CLI
//!
//! Entry point for the heap driver. Parses CLI arguments and delegates to
//! the Runtime for execution.

use clap::Parser as ClapParser;
use js_cli::{Cli, CliResult, Command, Runtime};

fn run(cli: Cli) -> CliResult<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Stress {
            objects,
            properties,
            collect_every_allocation,
        } => {
            let mut config = Runtime::load_config(config_path)?;
            config.heap.collect_on_every_allocation |= collect_every_allocation;
            let mut runtime = Runtime::new(config)?;
            let report = runtime.run_stress(objects, properties)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::DumpGraph => {
            let runtime = Runtime::from_config_file(config_path)?;
            println!("{}", serde_json::to_string_pretty(&runtime.dump_graph()?)?);
        }
        Command::Config => {
            let runtime = Runtime::from_config_file(config_path)?;
            println!("{}", serde_json::to_string_pretty(runtime.config())?);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
