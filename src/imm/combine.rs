//! Probability-weighted fusion of the per-mode outputs
//!
//! The combined estimate weights the updated states with the mode
//! probabilities of the current step. The combined prediction weights the
//! predicted states with the probabilities of the previous step, since the
//! current ones are not known until the measurement has been processed.

use nalgebra::RealField;

use crate::filters::kalman::KalmanState;
use crate::types::spaces::{StateCovariance, StateVector};

use super::params::NUM_MODES;

/// `sum_j w(j) x(j)`
pub fn weighted_mean<T: RealField + Copy, const N: usize>(
    means: &[StateVector<T, N>; NUM_MODES],
    weights: &[T; NUM_MODES],
) -> StateVector<T, N> {
    means
        .iter()
        .zip(weights.iter())
        .fold(StateVector::zeros(), |acc, (&x, &w)| acc + x * w)
}

/// Moment-matched combination of the updated per-mode estimates.
///
/// x = sum_j mu(j) x(j)
/// P = sum_j mu(j) [P(j) + (x(j) - x)(x(j) - x)^T]
pub fn combine_estimates<T: RealField + Copy, const N: usize>(
    estimates: &[KalmanState<T, N>; NUM_MODES],
    probabilities: &[T; NUM_MODES],
) -> KalmanState<T, N> {
    let means = [estimates[0].mean, estimates[1].mean];
    let mean = weighted_mean(&means, probabilities);

    let covariance = estimates
        .iter()
        .zip(probabilities.iter())
        .fold(StateCovariance::zeros(), |acc, (estimate, &mu)| {
            let spread = (estimate.mean - mean).outer();
            acc + (estimate.covariance + spread).scale(mu)
        });

    KalmanState::new(mean, covariance.symmetrized())
}

/// Combined one-step prediction, weighted by the previous step's mode
/// probabilities.
pub fn combine_predictions<T: RealField + Copy, const N: usize>(
    predictions: &[KalmanState<T, N>; NUM_MODES],
    previous_probabilities: &[T; NUM_MODES],
) -> StateVector<T, N> {
    let means = [predictions[0].mean, predictions[1].mean];
    weighted_mean(&means, previous_probabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> [KalmanState<f64, 5>; 2] {
        [
            KalmanState::new(
                StateVector::from_array([10.0, 1.0, 0.0, 0.0, 0.0]),
                StateCovariance::identity(),
            ),
            KalmanState::new(
                StateVector::from_array([20.0, 1.0, 10.0, 0.0, 0.2]),
                StateCovariance::identity(),
            ),
        ]
    }

    #[test]
    fn test_combined_estimate_weights_means() {
        let combined = combine_estimates(&states(), &[0.75, 0.25]);

        assert!((combined.mean.index(0) - 12.5).abs() < 1e-12);
        assert!((combined.mean.index(2) - 2.5).abs() < 1e-12);
        assert!((combined.mean.index(4) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_combined_covariance_adds_spread() {
        let combined = combine_estimates(&states(), &[0.5, 0.5]);
        // 1 + ((-5)^2 + 5^2)/2
        assert!((combined.covariance.as_matrix()[(0, 0)] - 26.0).abs() < 1e-12);
        assert!(combined.covariance.asymmetry() < 1e-15);
    }

    #[test]
    fn test_prediction_uses_given_weights() {
        let prediction = combine_predictions(&states(), &[1.0, 0.0]);
        assert!((prediction.index(0) - 10.0).abs() < 1e-12);

        let prediction = combine_predictions(&states(), &[0.0, 1.0]);
        assert!((prediction.index(2) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_mode_collapses_to_that_mode() {
        let all = states();
        let combined = combine_estimates(&all, &[0.0, 1.0]);
        let ct = &all[1];

        assert!((combined.mean.as_svector() - ct.mean.as_svector()).amax() < 1e-12);
        assert!((combined.covariance.as_matrix() - ct.covariance.as_matrix()).amax() < 1e-12);
    }
}
