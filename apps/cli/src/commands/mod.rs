//! Command definitions

pub mod config;
pub mod simulate;

pub use config::ConfigCommand;
pub use simulate::SimulateCommand;

use anyhow::{Context, Result};
use clap::Args;
use pd_thermal::{BoardPreset, HeaterConfig, ThermalConfig};
use std::path::PathBuf;

/// Where the configuration comes from: a TOML file or a named preset
#[derive(Args, Debug, Clone)]
pub struct ConfigSource {
    /// TOML configuration file
    #[arg(short, long, conflicts_with_all = ["preset", "output_scale"])]
    pub config: Option<PathBuf>,

    /// Board preset
    #[arg(short, long, default_value = "v4")]
    pub preset: BoardPreset,

    /// Multiply the preset's output ceilings (capped at 1.0)
    #[arg(long)]
    pub output_scale: Option<f64>,
}

impl ConfigSource {
    /// Read the file, or build the preset with the requested scaling
    pub fn load(&self) -> Result<ThermalConfig> {
        match &self.config {
            Some(path) => ThermalConfig::load_from_file(path)
                .with_context(|| format!("failed to load {}", path.display())),
            None => {
                let heater = match self.preset {
                    BoardPreset::V4 => HeaterConfig::v4_scaled(self.output_scale.unwrap_or(1.0)),
                };
                let config = ThermalConfig {
                    heater,
                    ..Default::default()
                };
                config.validate().context("invalid preset configuration")?;
                Ok(config)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset_source() -> ConfigSource {
        ConfigSource {
            config: None,
            preset: BoardPreset::V4,
            output_scale: None,
        }
    }

    #[test]
    fn test_preset_source() {
        let config = preset_source().load().unwrap();
        assert_eq!(config.heater, HeaterConfig::v4());
    }

    #[test]
    fn test_scaled_preset_source() {
        let source = ConfigSource {
            output_scale: Some(0.5),
            ..preset_source()
        };
        let config = source.load().unwrap();
        assert_eq!(config.heater.ceilings().unwrap(), vec![0.49, 0.25, 0.25, 0.49]);
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermal.toml");
        let mut expected = ThermalConfig::default();
        expected.heater.kp = 12.0;
        expected.save_to_file(&path).unwrap();

        let source = ConfigSource {
            config: Some(path),
            ..preset_source()
        };
        assert_eq!(source.load().unwrap(), expected);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let source = ConfigSource {
            config: Some(PathBuf::from("/nonexistent/thermal.toml")),
            ..preset_source()
        };
        let err = source.load().unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/thermal.toml"));
    }
}
