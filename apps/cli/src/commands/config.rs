//! Configuration commands

use super::ConfigSource;
use anyhow::{Context, Result};
use clap::Subcommand;
use pd_thermal::ThermalConfig;
use std::path::{Path, PathBuf};

/// Configuration commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the configuration as TOML
    Show {
        #[command(flatten)]
        source: ConfigSource,
    },

    /// Load and validate a TOML file
    Check {
        /// File to check
        path: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Show { source } => {
                let config = source.load()?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },
            ConfigCommand::Check { path } => {
                let summary = check(&path)?;
                println!("{}", summary);
                Ok(())
            },
        }
    }
}

/// Validate `path` and describe what it configures
fn check(path: &Path) -> Result<String> {
    let config = ThermalConfig::load_from_file(path)
        .with_context(|| format!("{} is not a valid configuration", path.display()))?;

    let heater = &config.heater;
    let ceilings = heater.ceilings()?;
    let looping = &config.control_loop;

    Ok(format!(
        "{}: ok\n  zones:       {}\n  gains:       {:?}\n  ceilings:    {:?}\n  kp/ti/td:    {} / {} s / {} s\n  drop model:  k_drop {} alpha {} ambient {} °C\n  loop:        every {} ms (poll {} ms), faults: {:?}",
        path.display(),
        heater.zone_count(),
        heater.channel_gains,
        ceilings,
        heater.kp,
        heater.ti,
        heater.td,
        heater.k_drop,
        heater.alpha_drop,
        heater.ambient(),
        looping.period_ms,
        looping.poll_interval_ms,
        looping.fault_policy,
    ))
}
