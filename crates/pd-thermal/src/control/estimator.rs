//! Drop-temperature estimator
//!
//! The sensors sit below the dielectric, so they read warmer than the liquid
//! on the electrodes. The gap is proportional to the rise above ambient:
//!
//! ```text
//! T_drop = T_sensor - k_drop * (T_sensor - T_ambient)
//! ```
//!
//! The per-step value is smoothed with a single-tap IIR filter whose gain is
//! proportional to the elapsed time, capped at 1:
//!
//! ```text
//! k = min(1, alpha_drop * dt)
//! T_est = T_est * (1 - k) + T_drop * k
//! ```

use std::time::Duration;

/// Low-pass estimate of the temperature at the controlled surface
#[derive(Debug, Clone, PartialEq)]
pub struct DropEstimator {
    k_drop: f64,
    alpha_drop: f64,
    ambient: f64,
    estimate: f64,
}

impl DropEstimator {
    /// Estimator starting at the ambient temperature
    pub fn new(k_drop: f64, alpha_drop: f64, ambient: f64) -> Self {
        DropEstimator {
            k_drop,
            alpha_drop,
            ambient,
            estimate: ambient,
        }
    }

    /// Current estimate in °C
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Surface temperature implied by one sensor temperature
    pub fn drop_adjusted(&self, sensor: f64) -> f64 {
        sensor - self.k_drop * (sensor - self.ambient)
    }

    /// Sensor temperature that corresponds to a surface setpoint
    ///
    /// Inverse of [`drop_adjusted`](Self::drop_adjusted).
    pub fn sensor_setpoint(&self, setpoint: f64) -> f64 {
        (setpoint - self.k_drop * self.ambient) / (1.0 - self.k_drop)
    }

    /// Filter gain for a step of length `dt`
    pub fn filter_gain(&self, dt: Duration) -> f64 {
        (self.alpha_drop * dt.as_secs_f64()).min(1.0)
    }

    /// Fold one set of sensor readings into the estimate
    ///
    /// An empty slice, or one whose average isn't finite, leaves the estimate
    /// unchanged.
    pub fn update(&mut self, readings: &[f64], dt: Duration) -> f64 {
        if readings.is_empty() {
            return self.estimate;
        }

        let sensor_avg = readings.iter().sum::<f64>() / readings.len() as f64;
        if !sensor_avg.is_finite() {
            return self.estimate;
        }
        let adjusted = self.drop_adjusted(sensor_avg);
        let k = self.filter_gain(dt);

        self.estimate = self.estimate * (1.0 - k) + adjusted * k;
        self.estimate
    }
}
