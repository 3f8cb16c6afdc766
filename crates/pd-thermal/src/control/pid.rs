//! PID Unit - single-zone PID controller
//!
//! One instance per heater zone. The unit knows nothing about other zones,
//! the setpoint or the sensors; it turns an error and a feed-forward term into
//! a clamped duty cycle.
//!
//! # Algorithm
//!
//! ```text
//! y = feed_forward + kP * (e + accum + tD/dt * (e - prev_e))
//! y = clamp(y, y_min, y_max)
//! accum += dt/tI * e        (skipped when saturated in the direction of e)
//! ```
//!
//! `accum` is kept in error units, so `kP * accum` is the integral
//! contribution in output units. It is clamped to `±i_max / kP` before it is
//! used and again after integrating, so `|kP * accum| <= i_max` always holds.
//!
//! # Derivative term
//!
//! The tuned reference controller never updates `prev_e`; it stays `0.0`, and
//! the derivative term collapses to `kP * tD/dt * e`, an extra proportional
//! action whose weight depends on the step period. The board presets were
//! tuned against that behaviour, so it is the default
//! ([`DerivativeMode::Reference`]). [`DerivativeMode::Tracking`] updates
//! `prev_e` every call and yields a true derivative on error; it changes the
//! closed-loop response and must be opted into.
//!
//! # Example
//!
//! ```
//! use pd_thermal::control::{PidParams, PidUnit};
//! use std::time::{Duration, Instant};
//!
//! let params = PidParams::new(0.126, 6.0, 0.8)
//!     .with_output_limits(0.0, 0.98)
//!     .with_integral_limit(0.35);
//!
//! let t0 = Instant::now();
//! let mut pid = PidUnit::starting_at(params, t0);
//! let duty = pid.evaluate_at(2.0, 0.1, t0 + Duration::from_millis(500));
//! assert!((0.0..=0.98).contains(&duty));
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// How the derivative history is maintained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeMode {
    /// `prev_e` is never updated (stays 0.0), matching the tuned reference controller
    #[default]
    Reference,
    /// `prev_e` follows the last error; the first call has no derivative term
    Tracking,
}

/// Which output bound the last evaluation hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Saturation {
    #[default]
    None,
    Upper,
    Lower,
}

/// PID tuning and limits for one zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidParams {
    /// Proportional gain (kP)
    pub kp: f64,
    /// Integral time constant in seconds (tI)
    pub ti: f64,
    /// Derivative time constant in seconds (tD)
    pub td: f64,
    /// Output ceiling
    pub y_max: f64,
    /// Output floor
    pub y_min: f64,
    /// Bound on `|kP * accum|`, in output units
    pub i_max: f64,
}

impl PidParams {
    /// Gains only; output limited to `[0.0, 1.0]`, integral limited to 1.0
    pub fn new(kp: f64, ti: f64, td: f64) -> Self {
        PidParams {
            kp,
            ti,
            td,
            y_max: 1.0,
            y_min: 0.0,
            i_max: 1.0,
        }
    }

    /// Set output floor and ceiling
    pub fn with_output_limits(mut self, y_min: f64, y_max: f64) -> Self {
        self.y_min = y_min;
        self.y_max = y_max;
        self
    }

    /// Set the integral clamp (output units)
    pub fn with_integral_limit(mut self, i_max: f64) -> Self {
        self.i_max = i_max;
        self
    }

    /// Reject parameter sets the algorithm can't run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.kp, self.ti, self.td, self.y_max, self.y_min, self.i_max];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "PID parameters must be finite: {:?}",
                self
            )));
        }
        if self.kp <= 0.0 {
            return Err(ConfigError::Invalid(format!("kp must be > 0 (got {})", self.kp)));
        }
        if self.ti <= 0.0 {
            return Err(ConfigError::Invalid(format!("ti must be > 0 (got {})", self.ti)));
        }
        if self.td < 0.0 {
            return Err(ConfigError::Invalid(format!("td must be >= 0 (got {})", self.td)));
        }
        if self.i_max < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "i_max must be >= 0 (got {})",
                self.i_max
            )));
        }
        if self.y_min > self.y_max {
            return Err(ConfigError::Invalid(format!(
                "y_min ({}) must not exceed y_max ({})",
                self.y_min, self.y_max
            )));
        }
        Ok(())
    }
}

/// Single-zone PID controller
#[derive(Debug, Clone)]
pub struct PidUnit {
    params: PidParams,
    mode: DerivativeMode,
    /// Integral state, in error units
    accum: f64,
    prev_error: f64,
    has_history: bool,
    last_run: Instant,
    saturation: Saturation,
}

impl PidUnit {
    /// Create a unit whose first `dt` is measured from now
    pub fn new(params: PidParams) -> Self {
        Self::starting_at(params, Instant::now())
    }

    /// Create a unit whose first `dt` is measured from `start`
    pub fn starting_at(params: PidParams, start: Instant) -> Self {
        PidUnit {
            params,
            mode: DerivativeMode::default(),
            accum: 0.0,
            prev_error: 0.0,
            has_history: false,
            last_run: start,
            saturation: Saturation::None,
        }
    }

    /// Select the derivative behaviour
    pub fn with_derivative_mode(mut self, mode: DerivativeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Evaluate using the current monotonic time
    pub fn evaluate(&mut self, error: f64, feed_forward: f64) -> f64 {
        self.evaluate_at(error, feed_forward, Instant::now())
    }

    /// Evaluate with an explicit timestamp
    ///
    /// `now` earlier than the previous call counts as `dt = 0`. The result is
    /// always within `[y_min, y_max]`: a NaN output is pinned to `y_min`, and a
    /// non-finite error is neither integrated nor kept as derivative history.
    pub fn evaluate_at(&mut self, error: f64, feed_forward: f64, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last_run).as_secs_f64();
        self.last_run = now;

        let p = self.params;

        self.clamp_accum();

        let derivative = if dt > 0.0 {
            match self.mode {
                DerivativeMode::Reference => p.td / dt * (error - self.prev_error),
                DerivativeMode::Tracking if self.has_history => {
                    p.td / dt * (error - self.prev_error)
                },
                DerivativeMode::Tracking => 0.0,
            }
        } else {
            0.0
        };

        let mut y = feed_forward + p.kp * (error + self.accum + derivative);

        self.saturation = Saturation::None;
        if y.is_nan() {
            y = p.y_min;
            self.saturation = Saturation::Lower;
        }
        if y >= p.y_max {
            y = p.y_max;
            self.saturation = Saturation::Upper;
        }
        if y <= p.y_min {
            y = p.y_min;
            self.saturation = Saturation::Lower;
        }

        // Don't integrate further into the bound we are sitting on
        let integrate = error.is_finite()
            && ((error > 0.0 && self.saturation != Saturation::Upper)
                || (error < 0.0 && self.saturation != Saturation::Lower));
        if integrate {
            self.accum += dt / p.ti * error;
            self.clamp_accum();
        }

        if self.mode == DerivativeMode::Tracking && error.is_finite() {
            self.prev_error = error;
            self.has_history = true;
        }

        y
    }

    /// Integral contribution in output units (`kP * accum`)
    pub fn integral_contribution(&self) -> f64 {
        self.params.kp * self.accum
    }

    /// Raw integral state, in error units
    pub fn accum(&self) -> f64 {
        self.accum
    }

    /// Bound hit by the last evaluation
    pub fn saturation(&self) -> Saturation {
        self.saturation
    }

    /// Tuning and limits this unit runs with
    pub fn params(&self) -> &PidParams {
        &self.params
    }

    /// Derivative behaviour selected at construction
    pub fn derivative_mode(&self) -> DerivativeMode {
        self.mode
    }

    /// Clear integral and derivative history; timing is kept
    pub fn reset(&mut self) {
        self.accum = 0.0;
        self.prev_error = 0.0;
        self.has_history = false;
        self.saturation = Saturation::None;
    }

    fn clamp_accum(&mut self) {
        let limit = (self.params.i_max / self.params.kp).abs();
        if self.accum >= limit {
            self.accum = limit;
        } else if self.accum <= -limit {
            self.accum = -limit;
        }
    }
}
