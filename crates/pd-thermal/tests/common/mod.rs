//! Shared test fixtures
//!
//! `RecordingClient` keeps its state behind an `Arc`, so a test can keep a
//! clone and inspect reads and writes after the client has been moved into a
//! controller or a running loop.

#![allow(dead_code)]

use parking_lot::Mutex;
use pd_thermal::ZoneClient;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
#[error("mock link failure")]
pub struct MockLinkError;

type ReadHook = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Recorded {
    temperatures: Vec<f64>,
    writes: Vec<(usize, f64)>,
    reads: usize,
    read_delay: Duration,
    fail_reads: bool,
    on_read: Option<ReadHook>,
}

/// Mock client with fixed temperatures that records every call
#[derive(Clone, Default)]
pub struct RecordingClient {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingClient {
    pub fn new(temperatures: Vec<f64>) -> Self {
        let client = Self::default();
        client.set_temperatures(temperatures);
        client
    }

    pub fn set_temperatures(&self, temperatures: Vec<f64>) {
        self.inner.lock().temperatures = temperatures;
    }

    /// Block every read for `delay`
    pub fn set_read_delay(&self, delay: Duration) {
        self.inner.lock().read_delay = delay;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }

    /// Run `hook` inside every read, before temperatures are returned
    pub fn on_read(&self, hook: impl FnMut() + Send + 'static) {
        self.inner.lock().on_read = Some(Box::new(hook));
    }

    pub fn reads(&self) -> usize {
        self.inner.lock().reads
    }

    pub fn writes(&self) -> Vec<(usize, f64)> {
        self.inner.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().writes.clear();
    }
}

impl ZoneClient for RecordingClient {
    type Error = MockLinkError;

    fn read_zone_temperatures(&mut self) -> Result<Vec<f64>, MockLinkError> {
        let (delay, hook) = {
            let mut inner = self.inner.lock();
            inner.reads += 1;
            (inner.read_delay, inner.on_read.take())
        };

        // Hook and delay run without holding the lock
        if let Some(mut hook) = hook {
            hook();
            self.inner.lock().on_read = Some(hook);
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let inner = self.inner.lock();
        if inner.fail_reads {
            return Err(MockLinkError);
        }
        Ok(inner.temperatures.clone())
    }

    fn set_zone_duty_cycle(&mut self, zone: usize, duty_cycle: f64) -> Result<(), MockLinkError> {
        self.inner.lock().writes.push((zone, duty_cycle));
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for_condition(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
