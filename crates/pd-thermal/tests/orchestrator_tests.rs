//! Multi-zone controller scenarios

mod common;

use approx::assert_relative_eq;
use common::{MockLinkError, RecordingClient};
use parking_lot::Mutex;
use pd_thermal::clock::ManualClock;
use pd_thermal::control::{ControlHandle, DerivativeMode};
use pd_thermal::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const STEP: Duration = Duration::from_millis(500);

fn v4_control(client: RecordingClient) -> (TemperatureControl<RecordingClient>, ManualClock) {
    let clock = ManualClock::new();
    let control = TemperatureControl::with_clock(client, &HeaterConfig::v4(), clock.clone()).unwrap();
    (control, clock)
}

#[test]
fn test_four_zone_outputs_stay_in_range() {
    let client = RecordingClient::new(vec![30.0; 4]);
    let (mut control, clock) = v4_control(client.clone());
    control.set_target(35.0);

    let ceilings = HeaterConfig::v4().ceilings().unwrap();
    for _ in 0..20 {
        clock.advance(STEP);
        let outputs = control.evaluate().unwrap();
        for (zone, y) in outputs.iter().enumerate() {
            assert!(*y >= 0.0 && *y <= ceilings[zone], "zone {} output {}", zone, y);
        }
    }

    // One write per zone per step, in zone order
    let writes = client.writes();
    assert_eq!(writes.len(), 80);
    for (i, (zone, _)) in writes.iter().enumerate() {
        assert_eq!(*zone, i % 4);
    }
}

#[test]
fn test_sensor_setpoint_and_feed_forward() {
    // Zero tD isolates P + feed-forward on the first step
    let mut config = HeaterConfig::v4();
    config.td = 0.0;

    let clock = ManualClock::new();
    let client = RecordingClient::new(vec![30.0; 4]);
    let mut control = TemperatureControl::with_clock(client, &config, clock.clone()).unwrap();
    control.set_target(35.0);
    clock.advance(STEP);

    let outputs = control.evaluate().unwrap();
    let sensor_setpoint = 33.0 / 0.9;
    let error = sensor_setpoint - 30.0;
    assert_relative_eq!(error, 6.666_666_666_666_664, epsilon = 1e-9);

    for (zone, gain) in config.channel_gains.iter().enumerate() {
        let expected = (sensor_setpoint - 20.0) * gain + 18.0 * gain * error;
        assert_relative_eq!(outputs[zone], expected, epsilon = 1e-9);
    }
}

#[test]
fn test_short_sensor_vector_is_rejected() {
    let client = RecordingClient::new(vec![30.0; 3]);
    let (mut control, clock) = v4_control(client.clone());
    control.set_target(35.0);
    clock.advance(STEP);

    let err = control.evaluate().unwrap_err();
    assert!(matches!(
        err,
        ControlError::MeasurementCountMismatch {
            expected: 4,
            actual: 3
        }
    ));
    assert!(client.writes().is_empty());
    assert_eq!(control.integrals(), vec![0.0; 4]);
}

#[test]
fn test_nan_reading_aborts_before_writes() {
    let client = RecordingClient::new(vec![40.0; 4]);
    let (mut control, clock) = v4_control(client.clone());
    control.set_target(35.0);

    clock.advance(STEP);
    control.evaluate().unwrap();
    let estimate = control.estimated_process_temperature();
    let integrals = control.integrals();
    let snapshot = control.snapshot();
    client.clear_writes();

    client.set_temperatures(vec![30.0, f64::NAN, 30.0, 30.0]);
    clock.advance(STEP);
    let err = control.evaluate().unwrap_err();
    assert!(matches!(
        err,
        ControlError::NonFiniteMeasurement { index: 1, value } if value.is_nan()
    ));

    assert!(client.writes().is_empty());
    assert_eq!(control.estimated_process_temperature(), estimate);
    assert_eq!(control.integrals(), integrals);
    assert_eq!(control.snapshot().step, snapshot.step);

    // Recovers on the next finite reading
    client.set_temperatures(vec![40.0; 4]);
    clock.advance(STEP);
    let outputs = control.evaluate().unwrap();
    assert!(outputs.iter().all(|y| y.is_finite()));
    assert!(control.estimated_process_temperature().is_finite());
    assert_eq!(control.snapshot().step, 2);
}

#[test]
fn test_infinite_extra_sensor_is_rejected() {
    let client = RecordingClient::new(vec![30.0, 30.0, 30.0, 30.0, f64::INFINITY]);
    let (mut control, clock) = v4_control(client.clone());
    control.set_target(35.0);
    clock.advance(STEP);

    let err = control.evaluate().unwrap_err();
    assert!(matches!(err, ControlError::NonFiniteMeasurement { index: 4, .. }));
    assert!(client.writes().is_empty());
    assert_eq!(control.estimated_process_temperature(), 20.0);
}

#[test]
fn test_nan_setpoint_writes_nothing() {
    let client = RecordingClient::new(vec![30.0; 4]);
    let (mut control, clock) = v4_control(client.clone());
    control.set_target(f64::NAN);
    clock.advance(STEP);

    let err = control.evaluate().unwrap_err();
    assert!(matches!(err, ControlError::NonFiniteSetpoint(v) if v.is_nan()));
    assert!(client.writes().is_empty());
    assert_eq!(control.integrals(), vec![0.0; 4]);

    control.set_target(35.0);
    clock.advance(STEP);
    let ceilings = HeaterConfig::v4().ceilings().unwrap();
    let outputs = control.evaluate().unwrap();
    for (zone, y) in outputs.iter().enumerate() {
        assert!(*y >= 0.0 && *y <= ceilings[zone]);
    }
}

#[test]
fn test_read_failure_keeps_source() {
    let client = RecordingClient::new(vec![30.0; 4]);
    client.set_fail_reads(true);
    let (mut control, _clock) = v4_control(client.clone());

    let err = control.evaluate().unwrap_err();
    assert!(err.client_error::<MockLinkError>().is_some());
    assert!(std::error::Error::source(&err).is_some());
    assert!(client.writes().is_empty());
}

#[test]
fn test_estimate_follows_sensors() {
    let client = RecordingClient::new(vec![40.0; 4]);
    let (mut control, clock) = v4_control(client);
    control.set_target(35.0);

    clock.advance(STEP);
    control.evaluate().unwrap();
    assert_relative_eq!(control.estimated_process_temperature(), 21.62, epsilon = 1e-9);

    // Converges to the drop-adjusted value 38.0
    for _ in 0..200 {
        clock.advance(STEP);
        control.evaluate().unwrap();
    }
    assert_relative_eq!(control.estimated_process_temperature(), 38.0, epsilon = 1e-6);
}

#[test]
fn test_setpoint_change_during_step_applies_next_step() {
    let client = RecordingClient::new(vec![30.0; 4]);
    let slot: Arc<Mutex<Option<ControlHandle>>> = Arc::new(Mutex::new(None));

    let hook_slot = slot.clone();
    client.on_read(move || {
        if let Some(handle) = hook_slot.lock().as_ref() {
            handle.set_target(50.0);
        }
    });

    let (mut control, clock) = v4_control(client);
    control.set_target(35.0);
    *slot.lock() = Some(control.handle());

    clock.advance(STEP);
    control.evaluate().unwrap();
    assert_eq!(control.snapshot().setpoint, 35.0);
    assert_eq!(control.target(), 50.0);

    clock.advance(STEP);
    control.evaluate().unwrap();
    assert_eq!(control.snapshot().setpoint, 50.0);
}

#[test]
fn test_integrals_stay_clamped_under_sustained_error() {
    // Sensors far below target: every zone saturates high and stops integrating
    let client = RecordingClient::new(vec![20.0; 4]);
    let (mut control, clock) = v4_control(client);
    control.set_target(80.0);

    for _ in 0..500 {
        clock.advance(STEP);
        control.evaluate().unwrap();
    }

    let config = HeaterConfig::v4();
    for (integral, gain) in control.integrals().iter().zip(&config.channel_gains) {
        assert!(integral.abs() <= 50.0 * gain + 1e-12);
    }
}

#[test]
fn test_closed_loop_reaches_target() {
    let clock = ManualClock::new();
    let board = SimulatedBoard::new(4, 20.0)
        .with_clock(clock.clone())
        .with_zone_gains(&[0.007, 0.003, 0.003, 0.007]);

    let mut control = TemperatureControl::with_clock(board, &HeaterConfig::v4(), clock.clone()).unwrap();
    control.set_target(35.0);

    for _ in 0..400 {
        clock.advance(STEP);
        control.evaluate().unwrap();
    }

    assert_relative_eq!(control.estimated_process_temperature(), 35.0, epsilon = 0.05);
    for t in control.client().temperatures() {
        assert_relative_eq!(*t, 33.0 / 0.9, epsilon = 0.05);
    }
}

#[test]
fn test_tracking_mode_closed_loop_reaches_target() {
    let clock = ManualClock::new();
    let board = SimulatedBoard::new(4, 20.0).with_clock(clock.clone());
    let config = HeaterConfig::v4().with_derivative_mode(DerivativeMode::Tracking);

    let mut control = TemperatureControl::with_clock(board, &config, clock.clone()).unwrap();
    control.set_target(30.0);

    for _ in 0..600 {
        clock.advance(STEP);
        control.evaluate().unwrap();
    }

    assert_relative_eq!(control.estimated_process_temperature(), 30.0, epsilon = 0.1);
}

#[test]
fn test_snapshot_serializes_to_json() {
    let client = RecordingClient::new(vec![30.0; 4]);
    let (mut control, clock) = v4_control(client);
    control.set_target(35.0);
    clock.advance(STEP);
    let outputs = control.evaluate().unwrap();

    let value = serde_json::to_value(&*control.snapshot()).unwrap();
    assert_eq!(value["step"], 1);
    assert_eq!(value["setpoint"], 35.0);
    assert_eq!(value["readings"].as_array().unwrap().len(), 4);
    assert_eq!(value["outputs"][0].as_f64().unwrap(), outputs[0]);
}
