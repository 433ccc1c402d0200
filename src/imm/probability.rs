//! Mode likelihoods and the Bayesian mode probability update

use nalgebra::RealField;
use num_traits::Float;

use crate::filters::kalman::FilterCycle;
use crate::types::gaussian::floored_likelihood;

use super::params::NUM_MODES;

/// Likelihood of the current measurement under one mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeLikelihood<T> {
    /// N(z - y-; 0, S), never below the floor
    pub value: T,
    /// Whether the floor replaced the density
    pub floored: bool,
}

/// Scores a filter cycle's innovation against its innovation covariance.
pub fn mode_likelihood<T: RealField + Float + Copy, const N: usize, const M: usize>(
    cycle: &FilterCycle<T, N, M>,
    floor: T,
) -> ModeLikelihood<T> {
    let (value, floored) =
        floored_likelihood(&cycle.innovation, cycle.innovation_cov.as_matrix(), floor);
    ModeLikelihood { value, floored }
}

/// `mu(j) = L(j) c_bar(j) / sum_k L(k) c_bar(k)`
///
/// With floored likelihoods and normalizers summing to one the denominator is
/// positive; should it still underflow, the predicted probabilities are
/// returned unchanged.
pub fn update_mode_probabilities<T: RealField + Float + Copy>(
    likelihoods: &[T; NUM_MODES],
    normalizers: &[T; NUM_MODES],
) -> [T; NUM_MODES] {
    let joint: [T; NUM_MODES] = core::array::from_fn(|j| likelihoods[j] * normalizers[j]);

    let mut total = T::zero();
    for &value in &joint {
        total += value;
    }

    if !(total > T::zero()) {
        return *normalizers;
    }

    joint.map(|value| value / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::kalman::KalmanState;
    use crate::types::spaces::{Innovation, MeasurementCovariance, StateCovariance, StateVector};

    fn cycle_with_innovation(y: [f64; 2]) -> FilterCycle<f64, 5, 2> {
        let state = KalmanState::new(StateVector::zeros(), StateCovariance::identity());
        FilterCycle {
            predicted: state.clone(),
            innovation: Innovation::from_array(y),
            innovation_cov: MeasurementCovariance::identity(),
            updated: state,
        }
    }

    #[test]
    fn test_equal_likelihoods_return_normalizers() {
        let c = [0.55, 0.45];
        let mu = update_mode_probabilities(&[0.3, 0.3], &c);

        assert!((mu[0] - 0.55).abs() < 1e-12);
        assert!((mu[1] - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_update_is_normalized() {
        let mu = update_mode_probabilities(&[2.0, 0.5], &[0.5, 0.5]);

        assert!((mu[0] + mu[1] - 1.0).abs() < 1e-12);
        assert!((mu[0] - 0.8).abs() < 1e-12);
        assert!(mu.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_floored_likelihoods_keep_probabilities_finite() {
        let mu = update_mode_probabilities(&[1e-300, 1e-300], &[0.9, 0.1]);

        assert!((mu[0] - 0.9).abs() < 1e-12);
        assert!((mu[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_mode_likelihood_floors_outliers() {
        let good = mode_likelihood(&cycle_with_innovation([0.1, -0.2]), 1e-300);
        assert!(!good.floored);
        assert!(good.value > 0.1);

        let outlier = mode_likelihood(&cycle_with_innovation([1e3, 1e3]), 1e-300);
        assert!(outlier.floored);
        assert!((outlier.value - 1e-300).abs() < 1e-310);
    }
}
