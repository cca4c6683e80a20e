//! ARPolicy CLI - Command-line interface
//!
//! Drives the ARPolicy library with synthetic inputs and manages its
//! configuration and the persisted AR opt-in.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::ar::ArCommands;
use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "arpolicy")]
#[command(version, about = "Resource and degradation policy for AR rendering", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.arpolicy/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the policy layer against synthetic loader, thermal and feed inputs
    Simulate {
        /// Simulation length in seconds
        #[arg(long, default_value = "20")]
        duration: u64,

        /// Interval between recognition snapshots in milliseconds
        #[arg(long, default_value = "500")]
        tick_ms: u64,

        /// Model identifiers to cycle through
        #[arg(long, value_delimiter = ',', default_value = "poster,statue,mural")]
        models: Vec<String>,

        /// Peak thermal severity reached at the midpoint (0.0 to 1.0)
        #[arg(long, default_value = "0.9")]
        heat: f32,

        /// Estimated size of a High-tier model (e.g., 24MB)
        #[arg(long, default_value = "24MB")]
        model_size: String,

        /// Simulated load latency in milliseconds
        #[arg(long, default_value = "150")]
        load_delay_ms: u64,

        /// Override the cache budget from the config file (e.g., 64MB)
        #[arg(long)]
        budget: Option<String>,

        /// Model identifiers whose loads always fail
        #[arg(long, value_delimiter = ',')]
        fail: Vec<String>,

        /// Report the device as lacking AR support
        #[arg(long)]
        unsupported: bool,

        /// Honor the persisted ar_enabled preference instead of forcing AR on
        #[arg(long)]
        use_preferences: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage the persisted AR opt-in
    Ar {
        #[command(subcommand)]
        command: ArCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Simulate {
            duration,
            tick_ms,
            models,
            heat,
            model_size,
            load_delay_ms,
            budget,
            fail,
            unsupported,
            use_preferences,
        } => {
            let runner = CliRunner::new(cli.config, cli.debug)?;
            commands::simulate::run(
                SimulateArgs {
                    duration_secs: duration,
                    tick_ms,
                    models,
                    heat,
                    model_size,
                    load_delay_ms,
                    budget,
                    fail,
                    unsupported,
                    use_preferences,
                },
                &runner,
            )
        }
        Commands::Config { command } => commands::config::run(command, cli.config),
        Commands::Ar { command } => {
            let path = cli.config.unwrap_or_else(arpolicy::config::config_file_path);
            let config = arpolicy::config::ConfigFile::load_from(&path)?;
            commands::ar::run(command, &config)
        }
    }
}
