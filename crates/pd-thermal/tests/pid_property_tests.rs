//! PID unit properties
//!
//! Random error sequences with random tuning, checked against the clamps and
//! the anti-windup rule.

use pd_thermal::control::{DerivativeMode, PidParams, PidUnit, Saturation};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn params_strategy() -> impl Strategy<Value = PidParams> {
    (
        0.001..2.0f64,
        0.5..20.0f64,
        0.0..2.0f64,
        0.0..0.4f64,
        0.5..1.0f64,
        0.01..1.0f64,
    )
        .prop_map(|(kp, ti, td, y_min, y_max, i_max)| {
            PidParams::new(kp, ti, td)
                .with_output_limits(y_min, y_max)
                .with_integral_limit(i_max)
        })
}

fn mode_strategy() -> impl Strategy<Value = DerivativeMode> {
    prop_oneof![Just(DerivativeMode::Reference), Just(DerivativeMode::Tracking)]
}

proptest! {
    /// The integral contribution never leaves `[-i_max, i_max]`
    #[test]
    fn integral_stays_clamped(
        params in params_strategy(),
        mode in mode_strategy(),
        steps in prop::collection::vec((-50.0..50.0f64, -1.0..1.0f64, 1u64..2_000), 1..100),
    ) {
        let t0 = Instant::now();
        let mut now = t0;
        let mut pid = PidUnit::starting_at(params, t0).with_derivative_mode(mode);

        for (error, ff, dt_ms) in steps {
            now += Duration::from_millis(dt_ms);
            pid.evaluate_at(error, ff, now);
            prop_assert!(
                pid.integral_contribution().abs() <= params.i_max * (1.0 + 1e-9),
                "integral {} exceeds {}",
                pid.integral_contribution(),
                params.i_max
            );
        }
    }

    /// Every output is inside `[y_min, y_max]`
    #[test]
    fn output_stays_clamped(
        params in params_strategy(),
        mode in mode_strategy(),
        steps in prop::collection::vec((-50.0..50.0f64, -2.0..2.0f64, 0u64..2_000), 1..100),
    ) {
        let t0 = Instant::now();
        let mut now = t0;
        let mut pid = PidUnit::starting_at(params, t0).with_derivative_mode(mode);

        for (error, ff, dt_ms) in steps {
            now += Duration::from_millis(dt_ms);
            let y = pid.evaluate_at(error, ff, now);
            prop_assert!(y >= params.y_min && y <= params.y_max, "output {} outside bounds", y);
        }
    }

    /// Saturated high with positive error: the integral does not grow.
    /// Saturated low with negative error: it does not shrink.
    #[test]
    fn no_windup_into_saturated_bound(
        params in params_strategy(),
        mode in mode_strategy(),
        steps in prop::collection::vec((-50.0..50.0f64, -2.0..2.0f64, 1u64..2_000), 1..100),
    ) {
        let t0 = Instant::now();
        let mut now = t0;
        let mut pid = PidUnit::starting_at(params, t0).with_derivative_mode(mode);

        for (error, ff, dt_ms) in steps {
            now += Duration::from_millis(dt_ms);
            // State after the pre-use clamp, which is all the step may integrate from
            let limit = params.i_max / params.kp;
            let before = pid.accum().clamp(-limit, limit);

            pid.evaluate_at(error, ff, now);

            match pid.saturation() {
                Saturation::Upper if error > 0.0 => prop_assert!(pid.accum() <= before + 1e-12),
                Saturation::Lower if error < 0.0 => prop_assert!(pid.accum() >= before - 1e-12),
                _ => {},
            }
        }
    }

    /// Zero error never changes the integral
    #[test]
    fn zero_error_does_not_integrate(
        params in params_strategy(),
        ff in -1.0..1.0f64,
        count in 1usize..50,
    ) {
        let t0 = Instant::now();
        let mut pid = PidUnit::starting_at(params, t0);
        for i in 1..=count {
            pid.evaluate_at(0.0, ff, t0 + Duration::from_millis(500 * i as u64));
            prop_assert_eq!(pid.accum(), 0.0);
        }
    }
}
