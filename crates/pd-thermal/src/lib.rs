//! pd-thermal - multi-zone heater control for PurpleDrop electrode boards
//!
//! Holds a liquid drop at a target temperature by driving several
//! independently heated zones from their temperature sensors.
//!
//! # Architecture
//!
//! - **Client** (`client`): the two device calls the engine needs, plus a
//!   bounded-wait wrapper
//! - **Control** (`control`): PID units, the drop-temperature estimator and the
//!   multi-zone orchestrator
//! - **Scheduler** (`scheduler`): background thread running the orchestrator
//!   at a fixed period
//! - **Config** (`config`): TOML configuration and board presets
//! - **Sim** (`sim`): simulated board for tests and dry runs
//!
//! # Quick start
//!
//! ```no_run
//! use pd_thermal::prelude::*;
//!
//! # fn main() -> Result<(), ControlError> {
//! let board = SimulatedBoard::new(4, 20.0);
//! let control = TemperatureControl::new(board, &HeaterConfig::v4())?;
//! let mut control_loop = ControlLoop::new(control, LoopConfig::default())?;
//!
//! let handle = control_loop.handle();
//! handle.set_target(35.0);
//! control_loop.start()?;
//!
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! println!("drop at {:.2} °C", handle.estimated_process_temperature());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod scheduler;
pub mod sim;

pub mod prelude;

pub use client::{TimeoutClient, ZoneClient};
pub use config::{BoardPreset, HeaterConfig, LoopConfig, ThermalConfig};
pub use control::{ControlHandle, ControlSnapshot, TemperatureControl};
pub use error::{ClientCallError, ConfigError, ControlError};
pub use scheduler::ControlLoop;
