//! # pd-thermal
//!
//! Command-line tools for the heater controller.
//!
//! ```bash
//! # Closed-loop run against the simulated board
//! pd-thermal simulate --preset v4 --target 35 --duration 120
//!
//! # Print the preset as TOML, edit it, check it
//! pd-thermal config show --preset v4 > thermal.toml
//! pd-thermal config check thermal.toml
//! pd-thermal simulate --config thermal.toml --target 40 --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, SimulateCommand};

/// Heater controller tools
#[derive(Parser, Debug)]
#[command(name = "pd-thermal")]
#[command(about = "Multi-zone heater control tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the control loop against a simulated board
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },

    /// Show or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pd_thermal=info,pd_thermal_cli=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
