//! Typed transformation matrices
//!
//! Matrices that map vectors between spaces, with the source and target
//! spaces encoded in the type, plus the Kalman update primitives built on
//! them.

use ::core::marker::PhantomData;
use nalgebra::{RealField, SMatrix, Scalar};

use super::spaces::{
    DisturbanceCovariance, DisturbanceSpace, Innovation, InnovationSpace, Measurement,
    MeasurementCovariance, MeasurementSpace, StateCovariance, StateSpace, StateVector,
};

// ============================================================================
// Transform Matrix
// ============================================================================

/// A matrix mapping vectors from space `From` to space `To`.
///
/// # Type Parameters
///
/// - `ROWS`: dimension of the target space
/// - `COLS`: dimension of the source space
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Transform<T: Scalar, const ROWS: usize, const COLS: usize, To, From> {
    inner: SMatrix<T, ROWS, COLS>,
    _marker: PhantomData<(To, From)>,
}

impl<T: Scalar, const ROWS: usize, const COLS: usize, To, From> Transform<T, ROWS, COLS, To, From> {
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, ROWS, COLS>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, ROWS, COLS> {
        &self.inner
    }

    #[inline]
    pub fn into_matrix(self) -> SMatrix<T, ROWS, COLS> {
        self.inner
    }
}

impl<T: Scalar + Copy, const ROWS: usize, const COLS: usize, To: Clone, From: Clone> Copy
    for Transform<T, ROWS, COLS, To, From>
where
    SMatrix<T, ROWS, COLS>: Copy,
{
}

// ============================================================================
// Type Aliases
// ============================================================================

/// State transition matrix (or transition Jacobian): StateSpace -> StateSpace
pub type TransitionMatrix<T, const N: usize> = Transform<T, N, N, StateSpace, StateSpace>;

/// Observation matrix: StateSpace -> MeasurementSpace
pub type ObservationMatrix<T, const M: usize, const N: usize> =
    Transform<T, M, N, MeasurementSpace, StateSpace>;

/// Kalman gain: InnovationSpace -> StateSpace
pub type KalmanGain<T, const N: usize, const M: usize> =
    Transform<T, N, M, StateSpace, InnovationSpace>;

/// Noise input matrix G: DisturbanceSpace -> StateSpace
pub type NoiseInputMatrix<T, const N: usize, const D: usize> =
    Transform<T, N, D, StateSpace, DisturbanceSpace>;

// ============================================================================
// Specific Transform Applications
// ============================================================================

impl<T: RealField + Copy, const N: usize> TransitionMatrix<T, N> {
    #[inline]
    pub fn identity() -> Self {
        Self::from_matrix(SMatrix::identity())
    }

    /// Applies the transition to a state vector.
    #[inline]
    pub fn apply_state(&self, state: &StateVector<T, N>) -> StateVector<T, N> {
        StateVector::from_svector(self.inner * state.as_svector())
    }

    /// Propagates a covariance matrix: F * P * F^T
    #[inline]
    pub fn propagate_covariance(&self, cov: &StateCovariance<T, N>) -> StateCovariance<T, N> {
        StateCovariance::from_matrix(self.inner * cov.as_matrix() * self.inner.transpose())
    }
}

impl<T: RealField + Copy, const M: usize, const N: usize> ObservationMatrix<T, M, N> {
    /// Applies the observation model to a state vector.
    #[inline]
    pub fn observe(&self, state: &StateVector<T, N>) -> Measurement<T, M> {
        Measurement::from_svector(self.inner * state.as_svector())
    }

    /// Projects state covariance to measurement space: H * P * H^T
    #[inline]
    pub fn project_covariance(&self, cov: &StateCovariance<T, N>) -> MeasurementCovariance<T, M> {
        MeasurementCovariance::from_matrix(self.inner * cov.as_matrix() * self.inner.transpose())
    }
}

impl<T: RealField + Copy, const N: usize, const M: usize> KalmanGain<T, N, M> {
    /// Maps an innovation to a state correction.
    #[inline]
    pub fn correct(&self, innovation: &Innovation<T, M>) -> StateVector<T, N> {
        StateVector::from_svector(self.inner * innovation.as_svector())
    }
}

impl<T: RealField + Copy, const N: usize, const D: usize> NoiseInputMatrix<T, N, D> {
    /// Maps a disturbance covariance into state space: G * Q * G^T
    #[inline]
    pub fn project_disturbance(&self, q: &DisturbanceCovariance<T, D>) -> StateCovariance<T, N> {
        StateCovariance::from_matrix(self.inner * q.as_matrix() * self.inner.transpose())
    }
}

// ============================================================================
// Kalman Update Primitives
// ============================================================================

/// Computes the symmetrized innovation covariance.
///
/// S = (H * P * H^T + R), then S <- (S + S^T) / 2 before it is ever inverted.
pub fn compute_innovation_covariance<T: RealField + Copy, const N: usize, const M: usize>(
    state_cov: &StateCovariance<T, N>,
    obs_matrix: &ObservationMatrix<T, M, N>,
    meas_noise: &MeasurementCovariance<T, M>,
) -> MeasurementCovariance<T, M> {
    obs_matrix
        .project_covariance(state_cov)
        .add(meas_noise)
        .symmetrized()
}

/// Computes the Kalman gain K = P * H^T * S^{-1}.
///
/// Returns `None` if S is singular.
pub fn compute_kalman_gain<T: RealField + Copy, const N: usize, const M: usize>(
    state_cov: &StateCovariance<T, N>,
    obs_matrix: &ObservationMatrix<T, M, N>,
    innovation_cov: &MeasurementCovariance<T, M>,
) -> Option<KalmanGain<T, N, M>> {
    let s_inv = innovation_cov.as_matrix().try_inverse()?;
    let k = state_cov.as_matrix() * obs_matrix.as_matrix().transpose() * s_inv;
    Some(KalmanGain::from_matrix(k))
}

/// Updates state covariance in Joseph form.
///
/// P_updated = (I - K*H) * P * (I - K*H)^T + K * R * K^T
pub fn joseph_update<T: RealField + Copy, const N: usize, const M: usize>(
    state_cov: &StateCovariance<T, N>,
    kalman_gain: &KalmanGain<T, N, M>,
    obs_matrix: &ObservationMatrix<T, M, N>,
    meas_noise: &MeasurementCovariance<T, M>,
) -> StateCovariance<T, N> {
    let k = kalman_gain.as_matrix();
    let i_kh = SMatrix::<T, N, N>::identity() - k * obs_matrix.as_matrix();

    let term1 = i_kh * state_cov.as_matrix() * i_kh.transpose();
    let term2 = k * meas_noise.as_matrix() * k.transpose();

    StateCovariance::from_matrix(term1 + term2)
}
