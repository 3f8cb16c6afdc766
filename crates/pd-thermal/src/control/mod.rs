//! Control algorithms
//!
//! - [`pid`]: single-zone PID unit
//! - [`estimator`]: drop-temperature low-pass estimator
//! - [`orchestrator`]: multi-zone controller built from the two

pub mod estimator;
pub mod orchestrator;
pub mod pid;

pub use estimator::DropEstimator;
pub use orchestrator::{ControlHandle, ControlSnapshot, TemperatureControl};
pub use pid::{DerivativeMode, PidParams, PidUnit, Saturation};
