//! Closed-loop run against the simulated board

use super::ConfigSource;
use anyhow::{Context, Result};
use clap::Args;
use pd_thermal::control::ControlSnapshot;
use pd_thermal::scheduler::LoopMetricsSnapshot;
use pd_thermal::sim::SimulatedBoard;
use pd_thermal::{ControlLoop, TemperatureControl};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Simulation arguments
#[derive(Args, Debug)]
pub struct SimulateCommand {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Drop temperature target (°C)
    #[arg(short, long)]
    pub target: f64,

    /// Run time in seconds
    #[arg(short, long, default_value_t = 60.0)]
    pub duration: f64,

    /// Ambient temperature (°C), overrides the configuration
    #[arg(short, long)]
    pub ambient: Option<f64>,

    /// Uniform sensor noise amplitude (°C)
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Seed for the sensor noise
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print one JSON object per line instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    elapsed_s: f64,
    #[serde(flatten)]
    snapshot: &'a ControlSnapshot,
}

impl SimulateCommand {
    pub fn execute(self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            anyhow::bail!("--duration must be a non-negative number of seconds");
        }

        let mut config = self.source.load()?;
        if let Some(ambient) = self.ambient {
            config.heater.ambient = Some(ambient);
        }
        config.validate().context("invalid configuration")?;

        let heater = &config.heater;
        let mut board = SimulatedBoard::new(heater.zone_count(), heater.ambient())
            .with_zone_gains(&heater.channel_gains)
            .with_noise(self.noise);
        if let Some(seed) = self.seed {
            board = board.with_seed(seed);
        }

        let control = TemperatureControl::new(board, heater)?;
        let mut control_loop = ControlLoop::new(control, config.control_loop.clone())?;
        let handle = control_loop.handle();
        let faults = control_loop.faults();

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;

        handle.set_target(self.target);
        control_loop.start()?;
        info!(target_c = self.target, duration_s = self.duration, "simulation started");

        let start = Instant::now();
        let run_for = Duration::from_secs_f64(self.duration);
        let mut next_report = start;
        if !self.json {
            print_header();
        }

        while start.elapsed() < run_for && !interrupted.load(Ordering::SeqCst) {
            for fault in faults.try_iter() {
                warn!(consecutive = fault.consecutive, "step failed: {}", fault.error);
            }

            if Instant::now() >= next_report {
                let snapshot = handle.snapshot();
                self.print(start.elapsed(), &snapshot)?;
                next_report += Duration::from_secs(1);
            }

            thread::sleep(Duration::from_millis(50));
        }

        control_loop.stop();
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted");
        }

        print_summary(&control_loop.metrics(), handle.estimated_process_temperature());
        Ok(())
    }

    fn print(&self, elapsed: Duration, snapshot: &ControlSnapshot) -> Result<()> {
        if self.json {
            let report = Report {
                elapsed_s: elapsed.as_secs_f64(),
                snapshot,
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "{:>7.1}  {:>7.2}  {:>7.2}  {:<32}  {}",
                elapsed.as_secs_f64(),
                snapshot.setpoint,
                snapshot.estimate,
                join(&snapshot.readings, 1),
                join(&snapshot.outputs, 3),
            );
        }
        Ok(())
    }
}

fn print_header() {
    println!(
        "{:>7}  {:>7}  {:>7}  {:<32}  {}",
        "t (s)", "target", "drop", "sensors (°C)", "duty"
    );
}

fn print_summary(metrics: &LoopMetricsSnapshot, estimate: f64) {
    eprintln!();
    eprintln!("steps:     {} ok, {} failed", metrics.steps_ok, metrics.steps_failed);
    eprintln!("overruns:  {}", metrics.overruns);
    eprintln!("final drop estimate: {:.2} °C", estimate);
}

fn join(values: &[f64], precision: usize) -> String {
    values
        .iter()
        .map(|v| format!("{:.*}", precision, v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_formats_values() {
        assert_eq!(join(&[1.0, 2.26], 1), "1.0 2.3");
        assert_eq!(join(&[], 3), "");
    }

    #[test]
    fn test_report_flattens_snapshot() {
        let snapshot = ControlSnapshot {
            step: 3,
            setpoint: 35.0,
            outputs: vec![0.1, 0.2],
            integrals: vec![0.0, 0.0],
            readings: vec![30.0, 31.0],
            estimate: 22.5,
        };
        let report = Report {
            elapsed_s: 1.5,
            snapshot: &snapshot,
        };

        let value: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["elapsed_s"], 1.5);
        assert_eq!(value["step"], 3);
        assert_eq!(value["estimate"], 22.5);
        assert_eq!(value["outputs"][1], 0.2);
    }
}
