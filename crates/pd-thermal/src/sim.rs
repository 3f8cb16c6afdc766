//! Simulated heater board
//!
//! Each zone is a first-order plant whose steady-state rise above ambient is
//! `duty / zone_gain` °C, approached with time constant `tau`:
//!
//! ```text
//! dT/dt = (T_ambient + duty / gain - T) / tau
//! ```
//!
//! The plant integrates lazily on every client call, using the elapsed time
//! on its [`Clock`]. Share a [`ManualClock`](crate::clock::ManualClock) with
//! the controller to get deterministic runs.

use crate::client::ZoneClient;
use crate::clock::{Clock, MonotonicClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default steady-state duty cycle per °C of rise
pub const DEFAULT_ZONE_GAIN: f64 = 0.005;

/// Default thermal time constant
pub const DEFAULT_TIME_CONSTANT: Duration = Duration::from_secs(30);

/// In-process stand-in for a heater board
pub struct SimulatedBoard {
    ambient: f64,
    zone_gains: Vec<f64>,
    tau: Duration,
    temperatures: Vec<f64>,
    duty_cycles: Vec<f64>,
    extra_sensors: usize,
    noise: f64,
    rng: StdRng,
    clock: Arc<dyn Clock>,
    last_update: Instant,
    reported_sensors: Option<usize>,
    read_failures: usize,
    write_failures: usize,
    writes: u64,
}

impl SimulatedBoard {
    /// `zones` heaters, all starting at `ambient`
    pub fn new(zones: usize, ambient: f64) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock);
        let last_update = clock.now();

        SimulatedBoard {
            ambient,
            zone_gains: vec![DEFAULT_ZONE_GAIN; zones],
            tau: DEFAULT_TIME_CONSTANT,
            temperatures: vec![ambient; zones],
            duty_cycles: vec![0.0; zones],
            extra_sensors: 0,
            noise: 0.0,
            rng: StdRng::from_entropy(),
            clock,
            last_update,
            reported_sensors: None,
            read_failures: 0,
            write_failures: 0,
            writes: 0,
        }
    }

    /// Read time from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self.last_update = self.clock.now();
        self
    }

    /// Per-zone steady-state duty cycle per °C
    ///
    /// Zones without an entry keep their current gain.
    pub fn with_zone_gains(mut self, gains: &[f64]) -> Self {
        for (slot, gain) in self.zone_gains.iter_mut().zip(gains) {
            *slot = *gain;
        }
        self
    }

    /// Thermal time constant shared by every zone
    pub fn with_time_constant(mut self, tau: Duration) -> Self {
        self.tau = tau;
        self
    }

    /// Uniform measurement noise of `±amplitude` °C
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// Reproducible noise
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Sensors beyond the heated zones, reading ambient
    pub fn with_extra_sensors(mut self, count: usize) -> Self {
        self.extra_sensors = count;
        self
    }

    /// Report only the first `count` readings (simulates a short response)
    pub fn set_reported_sensors(&mut self, count: Option<usize>) {
        self.reported_sensors = count;
    }

    /// Fail the next `count` reads
    pub fn fail_next_reads(&mut self, count: usize) {
        self.read_failures = count;
    }

    /// Fail the next `count` writes
    pub fn fail_next_writes(&mut self, count: usize) {
        self.write_failures = count;
    }

    /// Force the plant temperature of every zone
    pub fn set_temperatures(&mut self, temperature: f64) {
        self.temperatures.fill(temperature);
    }

    /// Noise-free plant temperatures
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Last duty cycle written to each zone
    pub fn duty_cycles(&self) -> &[f64] {
        &self.duty_cycles
    }

    /// Successful duty-cycle writes so far
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Advance the plant to the clock's current time
    fn integrate(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        if dt <= 0.0 {
            return;
        }

        // Exact step response for a constant input over dt
        let decay = (-dt / self.tau.as_secs_f64().max(f64::EPSILON)).exp();
        for ((temp, duty), gain) in self
            .temperatures
            .iter_mut()
            .zip(&self.duty_cycles)
            .zip(&self.zone_gains)
        {
            let steady = self.ambient + duty / gain;
            *temp = steady + (*temp - steady) * decay;
        }
    }

    fn measure(&mut self, true_temp: f64) -> f64 {
        if self.noise > 0.0 {
            true_temp + self.rng.gen_range(-self.noise..=self.noise)
        } else {
            true_temp
        }
    }
}

impl ZoneClient for SimulatedBoard {
    type Error = io::Error;

    fn read_zone_temperatures(&mut self) -> Result<Vec<f64>, io::Error> {
        self.integrate();

        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated read failure"));
        }

        let heated = self.temperatures.clone();
        let mut readings: Vec<f64> = heated.into_iter().map(|t| self.measure(t)).collect();
        for _ in 0..self.extra_sensors {
            let reading = self.measure(self.ambient);
            readings.push(reading);
        }

        if let Some(count) = self.reported_sensors {
            readings.truncate(count);
        }
        Ok(readings)
    }

    fn set_zone_duty_cycle(&mut self, zone: usize, duty_cycle: f64) -> Result<(), io::Error> {
        self.integrate();

        if self.write_failures > 0 {
            self.write_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        if zone >= self.duty_cycles.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("zone {} out of range", zone),
            ));
        }
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("duty cycle {} outside [0, 1]", duty_cycle),
            ));
        }

        self.duty_cycles[zone] = duty_cycle;
        self.writes += 1;
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBoard")
            .field("ambient", &self.ambient)
            .field("temperatures", &self.temperatures)
            .field("duty_cycles", &self.duty_cycles)
            .finish()
    }
}
