//! Sensor/actuator client boundary
//!
//! The engine compiles against [`ZoneClient`] only: one call to read every zone
//! temperature, one call to set a zone's heater duty cycle. Transport, RPC
//! framing and retries belong to the implementation.
//!
//! [`TimeoutClient`] adds a bounded wait around any client by moving it onto a
//! worker thread. A blocked call can't be cancelled, but the control loop stops
//! waiting for it.

use crate::error::ClientCallError;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Capability the control engine needs from the device client
pub trait ZoneClient {
    /// Transport / protocol error of this client
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the most recent temperature of every zone, in °C, ordered by zone id.
    ///
    /// The device may report more values than there are controlled zones.
    fn read_zone_temperatures(&mut self) -> Result<Vec<f64>, Self::Error>;

    /// Set the PWM duty cycle (0.0 ..= 1.0) of one zone's heater.
    fn set_zone_duty_cycle(&mut self, zone: usize, duty_cycle: f64) -> Result<(), Self::Error>;
}

impl<C: ZoneClient + ?Sized> ZoneClient for Box<C> {
    type Error = C::Error;

    fn read_zone_temperatures(&mut self) -> Result<Vec<f64>, Self::Error> {
        (**self).read_zone_temperatures()
    }

    fn set_zone_duty_cycle(&mut self, zone: usize, duty_cycle: f64) -> Result<(), Self::Error> {
        (**self).set_zone_duty_cycle(zone, duty_cycle)
    }
}

impl<C: ZoneClient + ?Sized> ZoneClient for &mut C {
    type Error = C::Error;

    fn read_zone_temperatures(&mut self) -> Result<Vec<f64>, Self::Error> {
        (**self).read_zone_temperatures()
    }

    fn set_zone_duty_cycle(&mut self, zone: usize, duty_cycle: f64) -> Result<(), Self::Error> {
        (**self).set_zone_duty_cycle(zone, duty_cycle)
    }
}

/// Request forwarded to the worker thread
enum Request<E> {
    ReadTemperatures {
        reply: Sender<Result<Vec<f64>, E>>,
    },
    SetDutyCycle {
        zone: usize,
        duty_cycle: f64,
        reply: Sender<Result<(), E>>,
    },
}

/// Bounded-wait wrapper around a [`ZoneClient`]
///
/// Every call gets at most `timeout` to be queued and answered. On timeout the
/// caller receives [`ClientCallError::Timeout`]; the late reply is discarded.
///
/// The worker exits once the wrapper is dropped and any in-flight call returns.
/// Drop does not join the worker, since the wrapped client may be the thing
/// that is hung.
///
/// # Example
///
/// ```
/// use pd_thermal::client::{TimeoutClient, ZoneClient};
/// use pd_thermal::sim::SimulatedBoard;
/// use std::time::Duration;
///
/// let board = SimulatedBoard::new(4, 20.0);
/// let mut client = TimeoutClient::new(board, Duration::from_millis(200)).unwrap();
/// let temps = client.read_zone_temperatures().unwrap();
/// assert_eq!(temps.len(), 4);
/// ```
pub struct TimeoutClient<C: ZoneClient> {
    requests: Sender<Request<C::Error>>,
    timeout: Duration,
    _worker: JoinHandle<()>,
}

impl<C> TimeoutClient<C>
where
    C: ZoneClient + Send + 'static,
{
    /// Queue depth between callers and the worker
    const QUEUE_DEPTH: usize = 4;

    /// Move `client` onto a worker thread, bounding each call by `timeout`.
    pub fn new(client: C, timeout: Duration) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(Self::QUEUE_DEPTH);

        let worker = thread::Builder::new()
            .name("pd-zone-client".into())
            .spawn(move || Self::worker_loop(client, rx))?;

        Ok(Self {
            requests: tx,
            timeout,
            _worker: worker,
        })
    }

    /// Per-call bound
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn worker_loop(mut client: C, requests: Receiver<Request<C::Error>>) {
        // Exits when every Sender is dropped
        for request in requests.iter() {
            match request {
                Request::ReadTemperatures { reply } => {
                    let _ = reply.send(client.read_zone_temperatures());
                },
                Request::SetDutyCycle {
                    zone,
                    duty_cycle,
                    reply,
                } => {
                    let _ = reply.send(client.set_zone_duty_cycle(zone, duty_cycle));
                },
            }
        }
        debug!("zone client worker exiting");
    }

    fn call<T>(
        &self,
        make: impl FnOnce(Sender<Result<T, C::Error>>) -> Request<C::Error>,
    ) -> Result<T, ClientCallError<C::Error>> {
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);

        match self.requests.send_deadline(make(reply_tx), deadline) {
            Ok(()) => {},
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("zone client queue full, worker appears stuck");
                return Err(ClientCallError::Timeout(self.timeout));
            },
            Err(SendTimeoutError::Disconnected(_)) => return Err(ClientCallError::Disconnected),
        }

        match reply_rx.recv_deadline(deadline) {
            Ok(result) => result.map_err(ClientCallError::Inner),
            Err(RecvTimeoutError::Timeout) => {
                warn!("zone client call exceeded {:?}", self.timeout);
                Err(ClientCallError::Timeout(self.timeout))
            },
            Err(RecvTimeoutError::Disconnected) => Err(ClientCallError::Disconnected),
        }
    }
}

impl<C> ZoneClient for TimeoutClient<C>
where
    C: ZoneClient + Send + 'static,
{
    type Error = ClientCallError<C::Error>;

    fn read_zone_temperatures(&mut self) -> Result<Vec<f64>, Self::Error> {
        self.call(|reply| Request::ReadTemperatures { reply })
    }

    fn set_zone_duty_cycle(&mut self, zone: usize, duty_cycle: f64) -> Result<(), Self::Error> {
        self.call(|reply| Request::SetDutyCycle {
            zone,
            duty_cycle,
            reply,
        })
    }
}
