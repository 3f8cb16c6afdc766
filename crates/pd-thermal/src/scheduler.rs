//! Periodic Scheduler
//!
//! Runs [`TemperatureControl::evaluate`] on a background thread at a fixed
//! cadence. The thread wakes every `poll_interval` to check the stop flag and
//! evaluates once at least `period` has passed since the previous evaluation;
//! the first poll evaluates immediately.
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopped
//!                         |
//!                         +-- fault with FaultPolicy::Stop --> Stopped
//! ```
//!
//! Failed steps are logged, counted in [`LoopMetrics`] and sent on a bounded
//! fault channel (see [`ControlLoop::faults`]). A step that panics is caught
//! and handled like a failed one ([`ControlError::StepPanicked`]).

use crate::client::ZoneClient;
use crate::config::{FaultPolicy, LoopConfig};
use crate::control::{ControlHandle, TemperatureControl};
use crate::error::ControlError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Loop counters, updated by the loop thread and readable from any thread
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// Steps that completed
    pub steps_ok: AtomicU64,

    /// Steps that returned an error
    pub steps_failed: AtomicU64,

    /// Faults discarded because the fault channel was full
    pub faults_dropped: AtomicU64,

    /// Steps that took longer than the loop period
    pub overruns: AtomicU64,
}

impl LoopMetrics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every counter
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            steps_ok: self.steps_ok.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            faults_dropped: self.faults_dropped.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

}

/// Point-in-time copy of [`LoopMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopMetricsSnapshot {
    pub steps_ok: u64,
    pub steps_failed: u64,
    /// Faults that never reached the channel
    pub faults_dropped: u64,
    pub overruns: u64,
}

impl LoopMetricsSnapshot {
    /// Steps attempted
    pub fn steps_total(&self) -> u64 {
        self.steps_ok + self.steps_failed
    }

    /// Failed steps as a percentage of attempted steps (0.0 when none ran)
    pub fn failure_rate(&self) -> f64 {
        let total = self.steps_total();
        if total == 0 {
            return 0.0;
        }
        self.steps_failed as f64 / total as f64 * 100.0
    }
}

/// A failed control step
#[derive(Debug)]
pub struct LoopFault {
    /// When the step started
    pub at: Instant,
    /// Failures in a row, including this one
    pub consecutive: u64,
    /// What went wrong
    pub error: ControlError,
}

/// Background runner for a [`TemperatureControl`]
///
/// Dropping a running loop stops it and waits for the thread.
///
/// # Example
///
/// ```no_run
/// use pd_thermal::config::{HeaterConfig, LoopConfig};
/// use pd_thermal::control::TemperatureControl;
/// use pd_thermal::scheduler::ControlLoop;
/// use pd_thermal::sim::SimulatedBoard;
///
/// # fn main() -> Result<(), pd_thermal::ControlError> {
/// let control = TemperatureControl::new(SimulatedBoard::new(4, 20.0), &HeaterConfig::v4())?;
/// let mut control_loop = ControlLoop::new(control, LoopConfig::default())?;
///
/// control_loop.handle().set_target(35.0);
/// control_loop.start()?;
/// std::thread::sleep(std::time::Duration::from_secs(2));
/// control_loop.stop();
/// # Ok(())
/// # }
/// ```
pub struct ControlLoop<C: ZoneClient> {
    control: Arc<Mutex<TemperatureControl<C>>>,
    handle: ControlHandle,
    config: LoopConfig,
    metrics: Arc<LoopMetrics>,
    fault_tx: Sender<LoopFault>,
    fault_rx: Receiver<LoopFault>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<C> ControlLoop<C>
where
    C: ZoneClient + Send + 'static,
{
    /// Wrap a controller; the loop starts stopped
    pub fn new(control: TemperatureControl<C>, config: LoopConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let (fault_tx, fault_rx) = crossbeam_channel::bounded(config.fault_capacity);

        Ok(ControlLoop {
            handle: control.handle(),
            control: Arc::new(Mutex::new(control)),
            config,
            metrics: Arc::new(LoopMetrics::new()),
            fault_tx,
            fault_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }

    /// Spawn the loop thread
    ///
    /// Fails with [`ControlError::AlreadyRunning`] if the thread is active. A
    /// loop that ended on its own (fault policy `Stop`) can be started again.
    pub fn start(&mut self) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }
        // Reap a thread that exited on its own
        self.join_thread();

        self.shutdown.store(false, Ordering::Release);

        let worker = LoopWorker {
            control: self.control.clone(),
            period: self.config.period(),
            poll_interval: self.config.poll_interval(),
            policy: self.config.fault_policy,
            metrics: self.metrics.clone(),
            faults: self.fault_tx.clone(),
            shutdown: self.shutdown.clone(),
        };

        let thread = thread::Builder::new()
            .name("pd-thermal-loop".into())
            .spawn(move || worker.run())
            .map_err(ControlError::ThreadSpawn)?;

        self.thread = Some(thread);
        Ok(())
    }

    /// Stop the loop and wait for the thread to exit
    ///
    /// An in-flight step completes first. No-op if the loop isn't running.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.join_thread();
    }

    /// Whether the loop thread is alive
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Setpoint / snapshot handle of the controlled orchestrator
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Receiver for failed steps
    ///
    /// The channel holds `fault_capacity` entries; faults arriving while it is
    /// full are dropped and counted in [`LoopMetrics::faults_dropped`].
    pub fn faults(&self) -> Receiver<LoopFault> {
        self.fault_rx.clone()
    }

    /// Counters accumulated over every run of this loop
    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Timing and fault settings the loop was created with
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the controller
    ///
    /// Blocks while a step is in progress.
    pub fn with_control<R>(&self, f: impl FnOnce(&mut TemperatureControl<C>) -> R) -> R {
        let mut control = self.control.lock();
        f(&mut control)
    }
}

impl<C: ZoneClient> ControlLoop<C> {
    fn join_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("control loop thread panicked");
            }
        }
    }
}

impl<C: ZoneClient> Drop for ControlLoop<C> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.join_thread();
    }
}

/// State moved onto the loop thread
struct LoopWorker<C: ZoneClient> {
    control: Arc<Mutex<TemperatureControl<C>>>,
    period: Duration,
    poll_interval: Duration,
    policy: FaultPolicy,
    metrics: Arc<LoopMetrics>,
    faults: Sender<LoopFault>,
    shutdown: Arc<AtomicBool>,
}

impl<C: ZoneClient> LoopWorker<C> {
    fn run(self) {
        info!(
            period_ms = self.period.as_millis() as u64,
            poll_ms = self.poll_interval.as_millis() as u64,
            policy = ?self.policy,
            "control loop started"
        );

        let sleeper = SpinSleeper::default();
        let mut last_step: Option<Instant> = None;
        let mut consecutive_failures = 0u64;

        while !self.shutdown.load(Ordering::Acquire) {
            let now = Instant::now();
            let due = last_step.is_none_or(|t| now.duration_since(t) >= self.period);

            if due {
                last_step = Some(now);
                let step = AssertUnwindSafe(|| self.control.lock().evaluate());
                let result = panic::catch_unwind(step).unwrap_or_else(|payload| {
                    Err(ControlError::StepPanicked(panic_message(payload.as_ref())))
                });

                let took = now.elapsed();
                if took > self.period {
                    self.metrics.overruns.fetch_add(1, Ordering::Relaxed);
                    warn!(took_ms = took.as_millis() as u64, "control step overran the loop period");
                }

                match result {
                    Ok(_) => {
                        consecutive_failures = 0;
                        self.metrics.steps_ok.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => {
                        consecutive_failures += 1;
                        self.metrics.steps_failed.fetch_add(1, Ordering::Relaxed);
                        error!(consecutive = consecutive_failures, "control step failed: {}", e);

                        self.report(LoopFault {
                            at: now,
                            consecutive: consecutive_failures,
                            error: e,
                        });

                        if self.policy == FaultPolicy::Stop {
                            info!("control loop stopping after fault");
                            return;
                        }
                    },
                }
            }

            sleeper.sleep(self.poll_interval);
        }

        info!("control loop stopped");
    }

    fn report(&self, fault: LoopFault) {
        match self.faults.try_send(fault) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                self.metrics.faults_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("fault channel full, dropping fault");
            },
            // The loop owns a receiver, so this only happens during teardown
            Err(TrySendError::Disconnected(_)) => {},
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
