//! # Configuration
//!
//! Heater tuning and control-loop timing, loadable from TOML.
//!
//! ```toml
//! [heater]
//! channel_gains = [0.007, 0.003, 0.003, 0.007]
//! y_max = [0.98, 0.5, 0.5, 0.98]
//! kp = 18.0
//! ti = 6.0
//! td = 0.8
//! alpha_drop = 0.18
//! k_drop = 0.1
//!
//! [control_loop]
//! period_ms = 500
//! poll_interval_ms = 100
//! fault_policy = "continue"
//! ```

use crate::control::pid::{DerivativeMode, PidParams};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Ambient temperature assumed when none is configured (°C)
pub const DEFAULT_AMBIENT_C: f64 = 20.0;

/// Integral clamp per unit of channel gain, in output units
pub const DEFAULT_INTEGRAL_LIMIT: f64 = 50.0;

fn default_integral_limit() -> f64 {
    DEFAULT_INTEGRAL_LIMIT
}

/// Output ceiling: one value for every zone, or one per zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputCeiling {
    Uniform(f64),
    PerZone(Vec<f64>),
}

impl From<f64> for OutputCeiling {
    fn from(value: f64) -> Self {
        OutputCeiling::Uniform(value)
    }
}

impl From<Vec<f64>> for OutputCeiling {
    fn from(values: Vec<f64>) -> Self {
        OutputCeiling::PerZone(values)
    }
}

/// Heater controller tuning
///
/// Per-zone PID parameters are derived from the shared gains:
///
/// - `kP_i = kp * channel_gains[i]`
/// - `i_max_i = integral_limit * channel_gains[i]`
/// - output range `[0.0, y_max_i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaterConfig {
    /// Steady-state duty cycle per °C of rise, one entry per zone
    pub channel_gains: Vec<f64>,

    /// Output ceiling (duty cycle)
    pub y_max: OutputCeiling,

    /// Proportional gain (before the channel gain is applied)
    pub kp: f64,

    /// Integral time constant (s)
    pub ti: f64,

    /// Derivative time constant (s)
    pub td: f64,

    /// Drop-temperature filter rate (1/s)
    pub alpha_drop: f64,

    /// Fractional sensor-to-surface temperature drop, in [0, 1)
    pub k_drop: f64,

    /// Ambient temperature override (°C)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient: Option<f64>,

    /// Integral clamp per unit channel gain
    #[serde(default = "default_integral_limit")]
    pub integral_limit: f64,

    #[serde(default)]
    pub derivative_mode: DerivativeMode,
}

impl HeaterConfig {
    /// Preset for the rev4 electrode board with a 6 µm mylar dielectric
    ///
    /// Channel gains were characterised from the steady-state duty cycle per
    /// °C of rise on each heater.
    pub fn v4() -> Self {
        HeaterConfig {
            channel_gains: vec![0.007, 0.003, 0.003, 0.007],
            y_max: OutputCeiling::PerZone(vec![0.98, 0.5, 0.5, 0.98]),
            kp: 18.0,
            ti: 6.0,
            td: 0.8,
            alpha_drop: 0.18,
            k_drop: 0.10,
            ambient: None,
            integral_limit: DEFAULT_INTEGRAL_LIMIT,
            derivative_mode: DerivativeMode::Reference,
        }
    }

    /// v4 preset with every ceiling multiplied by `output_scale` (capped at 1.0)
    pub fn v4_scaled(output_scale: f64) -> Self {
        let mut config = Self::v4();
        if let OutputCeiling::PerZone(ref mut ceilings) = config.y_max {
            for c in ceilings.iter_mut() {
                *c = (*c * output_scale).min(1.0);
            }
        }
        config
    }

    /// Config for a named preset
    pub fn preset(preset: BoardPreset) -> Self {
        match preset {
            BoardPreset::V4 => Self::v4(),
        }
    }

    /// Pin the ambient temperature (°C)
    pub fn with_ambient(mut self, ambient: f64) -> Self {
        self.ambient = Some(ambient);
        self
    }

    /// Select the derivative behaviour of every zone
    pub fn with_derivative_mode(mut self, mode: DerivativeMode) -> Self {
        self.derivative_mode = mode;
        self
    }

    /// Number of heater zones
    pub fn zone_count(&self) -> usize {
        self.channel_gains.len()
    }

    /// Ambient temperature, falling back to [`DEFAULT_AMBIENT_C`]
    pub fn ambient(&self) -> f64 {
        self.ambient.unwrap_or(DEFAULT_AMBIENT_C)
    }

    /// Ceiling for every zone
    pub fn ceilings(&self) -> Result<Vec<f64>, ConfigError> {
        match &self.y_max {
            OutputCeiling::Uniform(v) => Ok(vec![*v; self.zone_count()]),
            OutputCeiling::PerZone(values) => {
                if values.len() != self.zone_count() {
                    return Err(ConfigError::ZoneCountMismatch {
                        field: "y_max",
                        expected: self.zone_count(),
                        actual: values.len(),
                    });
                }
                Ok(values.clone())
            },
        }
    }

    /// PID parameters of every zone, validated
    pub fn zone_params(&self) -> Result<Vec<PidParams>, ConfigError> {
        self.validate()?;
        self.build_zone_params()
    }

    fn build_zone_params(&self) -> Result<Vec<PidParams>, ConfigError> {
        let ceilings = self.ceilings()?;
        Ok(self
            .channel_gains
            .iter()
            .zip(ceilings)
            .map(|(&gain, y_max)| {
                PidParams::new(self.kp * gain, self.ti, self.td)
                    .with_output_limits(0.0, y_max)
                    .with_integral_limit(self.integral_limit * gain)
            })
            .collect())
    }

    /// Check ranges and per-zone lengths
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_gains.is_empty() {
            return Err(ConfigError::Invalid("at least one zone is required".into()));
        }
        for (zone, gain) in self.channel_gains.iter().enumerate() {
            if !gain.is_finite() || *gain <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "channel_gains[{}] must be a positive number (got {})",
                    zone, gain
                )));
            }
        }
        if !(0.0..1.0).contains(&self.k_drop) {
            return Err(ConfigError::Invalid(format!(
                "k_drop must be in [0, 1) (got {})",
                self.k_drop
            )));
        }
        if !self.alpha_drop.is_finite() || self.alpha_drop < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "alpha_drop must be >= 0 (got {})",
                self.alpha_drop
            )));
        }
        if !self.ambient().is_finite() {
            return Err(ConfigError::Invalid("ambient must be finite".into()));
        }
        if !self.integral_limit.is_finite() || self.integral_limit < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "integral_limit must be >= 0 (got {})",
                self.integral_limit
            )));
        }
        for (zone, ceiling) in self.ceilings()?.iter().enumerate() {
            if !(0.0..=1.0).contains(ceiling) {
                return Err(ConfigError::Invalid(format!(
                    "y_max[{}] must be a duty cycle in [0, 1] (got {})",
                    zone, ceiling
                )));
            }
        }
        for params in self.build_zone_params()? {
            params.validate()?;
        }
        Ok(())
    }
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self::v4()
    }
}

/// Named hardware presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardPreset {
    /// Rev4 electrode board
    V4,
}

impl FromStr for BoardPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v4" | "rev4" => Ok(BoardPreset::V4),
            other => Err(ConfigError::Invalid(format!("unknown board preset '{}'", other))),
        }
    }
}

impl fmt::Display for BoardPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardPreset::V4 => write!(f, "v4"),
        }
    }
}

/// What the control loop does when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Report the fault and try again at the next period
    #[default]
    Continue,
    /// Report the fault and end the loop thread
    Stop,
}

/// Control loop timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Minimum time between two evaluations (ms)
    pub period_ms: u64,

    /// How often the loop thread wakes up to check the stop flag (ms)
    pub poll_interval_ms: u64,

    /// What the loop does after a failed step
    pub fault_policy: FaultPolicy,

    /// Faults buffered for [`ControlLoop::faults`](crate::scheduler::ControlLoop::faults)
    pub fault_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            period_ms: 500,
            poll_interval_ms: 100,
            fault_policy: FaultPolicy::Continue,
            fault_capacity: 16,
        }
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`
fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl LoopConfig {
    /// Minimum time between two evaluations
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Wake-up interval of the loop thread
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the evaluation period
    ///
    /// Stored in whole milliseconds: sub-millisecond parts are dropped.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period_ms = whole_millis(period);
        self
    }

    /// Set the wake-up interval
    ///
    /// Stored in whole milliseconds, so anything below 1 ms becomes 0 and is
    /// rejected by [`validate`](Self::validate).
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll_interval_ms = whole_millis(poll);
        self
    }

    /// Set what happens after a failed step
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Check timing consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.period_ms < self.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "period_ms ({}) must be >= poll_interval_ms ({})",
                self.period_ms, self.poll_interval_ms
            )));
        }
        if self.fault_capacity == 0 {
            return Err(ConfigError::Invalid("fault_capacity must be > 0".into()));
        }
        Ok(())
    }
}

/// Complete configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermalConfig {
    /// Zone layout, gains and drop model
    pub heater: HeaterConfig,

    #[serde(default)]
    pub control_loop: LoopConfig,
}

impl ThermalConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ThermalConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty-printed TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load and validate a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Write the configuration as TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.heater.validate()?;
        self.control_loop.validate()
    }
}
