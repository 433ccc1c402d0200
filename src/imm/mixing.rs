//! Mode mixing (the "interaction" step of the IMM)
//!
//! Each mode's filter starts a time step from a blend of all modes' previous
//! estimates, weighted by the probability that the target was in mode i
//! given that it is now in mode j:
//!
//! ```text
//! c_bar(j)  = sum_i P(i->j) mu(i)
//! MU(i, j)  = P(i->j) mu(i) / c_bar(j)
//! x0(j)     = sum_i MU(i, j) x(i)
//! P0(j)     = sum_i MU(i, j) [P(i) + (x(i) - x0(j)) (x(i) - x0(j))^T]
//! ```

use nalgebra::{RealField, SMatrix};
use num_traits::Float;

use crate::filters::kalman::KalmanState;
use crate::types::spaces::{StateCovariance, StateVector};

use super::params::{ModeTransitionMatrix, NUM_MODES};

/// Output of the mixing step.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedEstimates<T: RealField, const N: usize> {
    /// Predicted mode probabilities c_bar(j); reused by the probability update
    pub normalizers: [T; NUM_MODES],
    /// Mixing probabilities MU(i, j) (column j sums to 1)
    pub weights: SMatrix<T, NUM_MODES, NUM_MODES>,
    /// Mixed initial condition for each mode's filter
    pub initial: [KalmanState<T, N>; NUM_MODES],
}

/// Predicted mode probabilities `c_bar(j) = sum_i P(i->j) mu(i)`.
pub fn mixing_normalizers<T: RealField + Float + Copy>(
    transition: &ModeTransitionMatrix<T>,
    probabilities: &[T; NUM_MODES],
) -> [T; NUM_MODES] {
    let p = transition.as_matrix();
    core::array::from_fn(|j| {
        let mut c = T::zero();
        for (i, &mu) in probabilities.iter().enumerate() {
            c += p[(i, j)] * mu;
        }
        c
    })
}

/// Mixing probabilities `MU(i, j)`.
///
/// A mode that cannot be reached (`c_bar(j) == 0`) mixes only from itself.
pub fn mixing_weights<T: RealField + Float + Copy>(
    transition: &ModeTransitionMatrix<T>,
    probabilities: &[T; NUM_MODES],
    normalizers: &[T; NUM_MODES],
) -> SMatrix<T, NUM_MODES, NUM_MODES> {
    let p = transition.as_matrix();
    SMatrix::from_fn(|i, j| {
        let c = normalizers[j];
        if c > T::zero() {
            p[(i, j)] * probabilities[i] / c
        } else if i == j {
            T::one()
        } else {
            T::zero()
        }
    })
}

/// Blends the previous per-mode estimates into one initial condition per mode.
pub fn mix_estimates<T: RealField + Float + Copy, const N: usize>(
    estimates: &[KalmanState<T, N>; NUM_MODES],
    transition: &ModeTransitionMatrix<T>,
    probabilities: &[T; NUM_MODES],
) -> MixedEstimates<T, N> {
    let normalizers = mixing_normalizers(transition, probabilities);
    let weights = mixing_weights(transition, probabilities, &normalizers);

    let initial = core::array::from_fn(|j| {
        let mut mean = StateVector::<T, N>::zeros();
        for (i, estimate) in estimates.iter().enumerate() {
            mean = mean + estimate.mean * weights[(i, j)];
        }

        let mut covariance = StateCovariance::<T, N>::zeros();
        for (i, estimate) in estimates.iter().enumerate() {
            let spread = (estimate.mean - mean).outer();
            covariance = covariance + (estimate.covariance + spread).scale(weights[(i, j)]);
        }

        KalmanState::new(mean, covariance.symmetrized())
    });

    MixedEstimates {
        normalizers,
        weights,
        initial,
    }
}
