//! Common imports
//!
//! ```rust
//! use pd_thermal::prelude::*;
//! ```

pub use crate::client::{TimeoutClient, ZoneClient};
pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::config::{BoardPreset, FaultPolicy, HeaterConfig, LoopConfig, ThermalConfig};
pub use crate::control::{ControlHandle, ControlSnapshot, DerivativeMode, TemperatureControl};
pub use crate::scheduler::{ControlLoop, LoopFault, LoopMetricsSnapshot};
pub use crate::sim::SimulatedBoard;

pub use crate::error::{ClientCallError, ConfigError, ControlError};
