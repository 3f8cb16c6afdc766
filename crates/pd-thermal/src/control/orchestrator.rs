//! Control Orchestrator
//!
//! Turns one surface setpoint into per-zone duty cycles. Each step reads every
//! zone temperature, converts the setpoint to the matching sensor temperature,
//! runs each zone's PID unit with a feed-forward term and writes the outputs
//! back to the client. The drop-temperature estimate and a [`ControlSnapshot`]
//! are updated at the end of each successful step.
//!
//! The setpoint and the latest snapshot live in a [`ControlHandle`], which other
//! threads can use without waiting for a step to finish.

use super::estimator::DropEstimator;
use super::pid::PidUnit;
use crate::client::ZoneClient;
use crate::clock::{Clock, MonotonicClock};
use crate::config::HeaterConfig;
use crate::error::ControlError;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// State published after every successful step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSnapshot {
    /// Number of completed steps (0 before the first one)
    pub step: u64,
    /// Setpoint used by the step (°C)
    pub setpoint: f64,
    /// Duty cycle written to each zone
    pub outputs: Vec<f64>,
    /// Integral contribution of each zone, in output units
    pub integrals: Vec<f64>,
    /// Sensor readings the step was computed from
    pub readings: Vec<f64>,
    /// Filtered drop temperature (°C)
    pub estimate: f64,
}

impl ControlSnapshot {
    fn initial(zones: usize, setpoint: f64, estimate: f64) -> Self {
        ControlSnapshot {
            step: 0,
            setpoint,
            outputs: vec![0.0; zones],
            integrals: vec![0.0; zones],
            readings: Vec::new(),
            estimate,
        }
    }
}

struct Shared {
    /// f64 bits
    setpoint: AtomicU64,
    snapshot: ArcSwap<ControlSnapshot>,
}

/// Thread-safe view of a [`TemperatureControl`]
///
/// Cheap to clone. Setting the target never blocks, and reads never wait on an
/// in-flight step.
#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl ControlHandle {
    fn new(zones: usize, setpoint: f64, estimate: f64) -> Self {
        ControlHandle {
            shared: Arc::new(Shared {
                setpoint: AtomicU64::new(setpoint.to_bits()),
                snapshot: ArcSwap::from_pointee(ControlSnapshot::initial(
                    zones, setpoint, estimate,
                )),
            }),
        }
    }

    /// Set the surface temperature target (°C), picked up by the next step
    pub fn set_target(&self, setpoint: f64) {
        self.shared.setpoint.store(setpoint.to_bits(), Ordering::Release);
    }

    /// Current target (°C)
    pub fn target(&self) -> f64 {
        f64::from_bits(self.shared.setpoint.load(Ordering::Acquire))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<ControlSnapshot> {
        self.shared.snapshot.load_full()
    }

    /// Drop-temperature estimate as of the last completed step
    pub fn estimated_process_temperature(&self) -> f64 {
        self.shared.snapshot.load().estimate
    }

    /// Per-zone integral contributions as of the last completed step
    pub fn integrals(&self) -> Vec<f64> {
        self.shared.snapshot.load().integrals.clone()
    }

    fn publish(&self, snapshot: ControlSnapshot) {
        self.shared.snapshot.store(Arc::new(snapshot));
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("target", &self.target())
            .field("step", &self.shared.snapshot.load().step)
            .finish()
    }
}

/// Multi-zone heater controller
///
/// # Example
///
/// ```
/// use pd_thermal::config::HeaterConfig;
/// use pd_thermal::control::TemperatureControl;
/// use pd_thermal::sim::SimulatedBoard;
///
/// let board = SimulatedBoard::new(4, 20.0);
/// let mut control = TemperatureControl::new(board, &HeaterConfig::v4()).unwrap();
/// control.set_target(35.0);
///
/// let outputs = control.evaluate().unwrap();
/// assert_eq!(outputs.len(), 4);
/// ```
pub struct TemperatureControl<C: ZoneClient> {
    client: C,
    pids: Vec<PidUnit>,
    channel_gains: Vec<f64>,
    ambient: f64,
    estimator: DropEstimator,
    clock: Arc<dyn Clock>,
    last_run: Instant,
    steps: u64,
    handle: ControlHandle,
}

impl<C: ZoneClient> TemperatureControl<C> {
    /// Build a controller using the monotonic system clock
    pub fn new(client: C, config: &HeaterConfig) -> Result<Self, ControlError> {
        Self::with_clock(client, config, MonotonicClock)
    }

    /// Build a controller reading time from `clock`
    pub fn with_clock(
        client: C,
        config: &HeaterConfig,
        clock: impl Clock + 'static,
    ) -> Result<Self, ControlError> {
        let params = config.zone_params()?;
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let start = clock.now();

        let pids: Vec<PidUnit> = params
            .into_iter()
            .map(|p| PidUnit::starting_at(p, start).with_derivative_mode(config.derivative_mode))
            .collect();

        let ambient = config.ambient();
        let estimator = DropEstimator::new(config.k_drop, config.alpha_drop, ambient);
        let handle = ControlHandle::new(pids.len(), 0.0, estimator.estimate());

        debug!(
            zones = pids.len(),
            ambient,
            k_drop = config.k_drop,
            "temperature control created"
        );

        Ok(TemperatureControl {
            client,
            pids,
            channel_gains: config.channel_gains.clone(),
            ambient,
            estimator,
            clock,
            last_run: start,
            steps: 0,
            handle,
        })
    }

    /// Set the surface temperature target (°C)
    pub fn set_target(&self, setpoint: f64) {
        self.handle.set_target(setpoint);
    }

    /// Current surface temperature target (°C)
    pub fn target(&self) -> f64 {
        self.handle.target()
    }

    /// Number of controlled zones; the client may report more sensors
    pub fn zone_count(&self) -> usize {
        self.pids.len()
    }

    /// Handle sharing this controller's setpoint and snapshot
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// State published by the last successful step
    pub fn snapshot(&self) -> Arc<ControlSnapshot> {
        self.handle.snapshot()
    }

    /// Per-zone integral contributions, in output units
    pub fn integrals(&self) -> Vec<f64> {
        self.pids.iter().map(PidUnit::integral_contribution).collect()
    }

    /// Filtered drop temperature (°C)
    pub fn estimated_process_temperature(&self) -> f64 {
        self.estimator.estimate()
    }

    /// Sensor/actuator client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mutable access to the client, e.g. to reconfigure it between steps
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Consume the controller and hand back the client
    pub fn into_client(self) -> C {
        self.client
    }

    /// Run one control step and return the duty cycle written to each zone
    ///
    /// # Errors
    ///
    /// - [`ControlError::Client`] if reading or writing fails. A failed write
    ///   aborts the step; zones before it have already been written.
    /// - [`ControlError::MeasurementCountMismatch`] if fewer temperatures than
    ///   zones are returned. Nothing is written and PID state is unchanged.
    /// - [`ControlError::NonFiniteMeasurement`] if any reading is NaN or
    ///   infinite, and [`ControlError::NonFiniteSetpoint`] if the target is.
    ///   Both abort before any write and leave PID state and the estimate as
    ///   they were.
    pub fn evaluate(&mut self) -> Result<Vec<f64>, ControlError> {
        let setpoint = self.handle.target();
        let now = self.clock.now();
        let dt = now.saturating_duration_since(self.last_run);
        self.last_run = now;

        if !setpoint.is_finite() {
            return Err(ControlError::NonFiniteSetpoint(setpoint));
        }

        let readings = self
            .client
            .read_zone_temperatures()
            .map_err(ControlError::client)?;

        let zones = self.pids.len();
        if readings.len() < zones {
            return Err(ControlError::MeasurementCountMismatch {
                expected: zones,
                actual: readings.len(),
            });
        }
        if let Some((index, &value)) = readings.iter().enumerate().find(|(_, t)| !t.is_finite()) {
            return Err(ControlError::NonFiniteMeasurement { index, value });
        }

        let sensor_setpoint = self.estimator.sensor_setpoint(setpoint);

        let mut outputs = Vec::with_capacity(zones);
        for (zone, (pid, gain)) in self.pids.iter_mut().zip(&self.channel_gains).enumerate() {
            let error = sensor_setpoint - readings[zone];
            let feed_forward = (sensor_setpoint - self.ambient) * gain;
            let output = pid.evaluate_at(error, feed_forward, now);

            trace!(zone, error, feed_forward, output, "zone output");
            self.client
                .set_zone_duty_cycle(zone, output)
                .map_err(ControlError::client)?;
            outputs.push(output);
        }

        let estimate = self.estimator.update(&readings, dt);
        self.steps += 1;

        debug!(
            step = self.steps,
            setpoint,
            sensor_setpoint,
            estimate,
            "control step"
        );

        self.handle.publish(ControlSnapshot {
            step: self.steps,
            setpoint,
            outputs: outputs.clone(),
            integrals: self.integrals(),
            readings,
            estimate,
        });

        Ok(outputs)
    }
}

impl<C: ZoneClient> std::fmt::Debug for TemperatureControl<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureControl")
            .field("zones", &self.pids.len())
            .field("target", &self.target())
            .field("estimate", &self.estimator.estimate())
            .field("steps", &self.steps)
            .finish()
    }
}
