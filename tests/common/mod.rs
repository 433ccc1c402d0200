//! Common test helpers for IMM integration tests

#![allow(dead_code)]

use immtrack::filters::kalman::KalmanState;
use immtrack::imm::{ImmParameters, InitialStatePrior, ModeTransitionMatrix};
use immtrack::types::spaces::{Measurement, StateCovariance};

/// Creates a measurement at given position
pub fn make_measurement(x: f64, y: f64) -> Measurement<f64, 2> {
    Measurement::from_array([x, y])
}

/// Position measurements of a constant-velocity target, one per unit step,
/// starting one step after `start`
pub fn straight_line_measurements(
    start: [f64; 2],
    velocity: [f64; 2],
    dt: f64,
    steps: usize,
) -> Vec<Measurement<f64, 2>> {
    (1..=steps)
        .map(|k| {
            let t = k as f64 * dt;
            make_measurement(start[0] + velocity[0] * t, start[1] + velocity[1] * t)
        })
        .collect()
}

/// Standard tuning: T = 1, sticky transitions, isotropic noise, vague prior at the origin
pub fn make_parameters(q: f64, r: f64) -> ImmParameters<f64> {
    ImmParameters::new(
        1.0,
        ModeTransitionMatrix::sticky(0.95).unwrap(),
        nalgebra::matrix![q, 0.0; 0.0, q],
        nalgebra::matrix![r, 0.0; 0.0, r],
        InitialStatePrior::from_moments([0.0, 0.0], [0.0, 0.0], 0.0, 100.0, 100.0, 0.01),
    )
    .with_turn_rate_variance(1e-4)
}

/// Panics unless `cov` is symmetric with non-negative eigenvalues
pub fn assert_valid_covariance(cov: &StateCovariance<f64, 5>, context: &str) {
    let scale = cov.as_matrix().amax().max(1.0);
    assert!(
        cov.asymmetry() <= 1e-9 * scale,
        "{}: asymmetric covariance ({})",
        context,
        cov.asymmetry()
    );

    let eigenvalues = cov.as_matrix().symmetric_eigen().eigenvalues;
    for &lambda in eigenvalues.iter() {
        assert!(
            lambda >= -1e-9 * scale,
            "{}: negative eigenvalue {}",
            context,
            lambda
        );
    }
}

pub fn assert_valid_state(state: &KalmanState<f64, 5>, context: &str) {
    assert!(
        state.mean.as_svector().iter().all(|v| v.is_finite()),
        "{}: non-finite mean",
        context
    );
    assert_valid_covariance(&state.covariance, context);
}

/// Relative closeness for accumulated sums
pub fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0)
}
