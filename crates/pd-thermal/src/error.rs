//! Error types for the heater control engine

use std::time::Duration;
use thiserror::Error;

/// Boxed error coming from a [`ZoneClient`](crate::client::ZoneClient) implementation.
pub type BoxedClientError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the control engine
#[derive(Error, Debug)]
pub enum ControlError {
    /// The sensor vector is shorter than the number of controlled zones.
    ///
    /// The step is aborted before any actuator write.
    #[error("Measurement count mismatch: expected at least {expected} temperatures, got {actual}")]
    MeasurementCountMismatch { expected: usize, actual: usize },

    /// A sensor reading is NaN or infinite.
    ///
    /// The step is aborted before any actuator write.
    #[error("Non-finite temperature at sensor {index}: {value}")]
    NonFiniteMeasurement { index: usize, value: f64 },

    /// The target is NaN or infinite; no step runs until a finite one is set
    #[error("Non-finite setpoint: {0}")]
    NonFiniteSetpoint(f64),

    /// A control step panicked on the loop thread
    #[error("Control step panicked: {0}")]
    StepPanicked(String),

    /// `start()` was called while the control loop thread is active
    #[error("Control loop is already running")]
    AlreadyRunning,

    /// Failure reported by the sensor/actuator client.
    ///
    /// The original error is kept as the source and can be downcast.
    #[error("Client error: {0}")]
    Client(#[source] BoxedClientError),

    /// The controller configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The OS refused to spawn the control loop thread
    #[error("Failed to spawn control loop thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl ControlError {
    /// Wrap a client error without altering it.
    pub fn client<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ControlError::Client(Box::new(err))
    }

    /// Try to view the client error as a concrete type.
    pub fn client_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            ControlError::Client(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML document could not be parsed
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A per-zone sequence does not match the zone count
    #[error("`{field}` has {actual} entries but there are {expected} zones")]
    ZoneCountMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A value is outside its allowed range
    #[error("{0}")]
    Invalid(String),
}

/// Errors produced by [`TimeoutClient`](crate::client::TimeoutClient)
#[derive(Error, Debug)]
pub enum ClientCallError<E>
where
    E: std::error::Error + 'static,
{
    /// No reply within the configured bound
    #[error("Client call timed out after {0:?}")]
    Timeout(Duration),

    /// The worker thread is gone (it panicked or was shut down)
    #[error("Client worker disconnected")]
    Disconnected,

    /// The wrapped client returned an error
    #[error(transparent)]
    Inner(E),
}
