//! Observation (sensor) models
//!
//! Describes how position measurements relate to the target state.

use nalgebra::{RealField, SMatrix};

use crate::types::spaces::MeasurementCovariance;
use crate::types::transforms::ObservationMatrix;

use super::transition::STATE_DIM;

/// Dimension of a position measurement `[x, y]`.
pub const MEAS_DIM: usize = 2;

/// Trait for linear observation models.
///
/// Describes the measurement process:
/// z = H * x + v
///
/// where:
/// - H is the observation matrix
/// - v is zero-mean Gaussian measurement noise with covariance R
pub trait ObservationModel<T: RealField, const N: usize, const M: usize> {
    /// Returns the observation matrix.
    fn observation_matrix(&self) -> ObservationMatrix<T, M, N>;

    /// Returns the measurement noise covariance.
    fn measurement_noise(&self) -> MeasurementCovariance<T, M>;
}

/// Position-only sensor for the `[x, vx, y, vy, omega]` state.
///
/// Observes `[x, y]`. Both motion models share this sensor.
#[derive(Debug, Clone)]
pub struct PositionSensor<T: RealField> {
    /// Measurement noise covariance R
    pub noise: MeasurementCovariance<T, MEAS_DIM>,
}

impl<T: RealField + Copy> PositionSensor<T> {
    /// Creates a sensor with a full 2x2 noise covariance.
    ///
    /// # Panics
    /// Panics if `r` has non-positive variances or is not symmetric.
    pub fn new(r: SMatrix<T, MEAS_DIM, MEAS_DIM>) -> Self {
        assert!(
            r[(0, 0)] > T::zero() && r[(1, 1)] > T::zero(),
            "Measurement noise variances must be positive"
        );
        assert!(r[(0, 1)] == r[(1, 0)], "Measurement noise must be symmetric");
        assert!(
            r[(0, 0)] * r[(1, 1)] - r[(0, 1)] * r[(1, 0)] > T::zero(),
            "Measurement noise must be positive definite"
        );
        Self {
            noise: MeasurementCovariance::from_matrix(r),
        }
    }

    /// Creates a sensor with independent noise of standard deviation `sigma`
    /// on both axes.
    ///
    /// # Panics
    /// Panics if `sigma <= 0`.
    pub fn isotropic(sigma: T) -> Self {
        assert!(sigma > T::zero(), "Measurement noise sigma must be positive");
        let var = sigma * sigma;
        Self::new(nalgebra::matrix![var, T::zero(); T::zero(), var])
    }
}

impl<T: RealField + Copy> ObservationModel<T, STATE_DIM, MEAS_DIM> for PositionSensor<T> {
    fn observation_matrix(&self) -> ObservationMatrix<T, MEAS_DIM, STATE_DIM> {
        let one = T::one();
        let zero = T::zero();

        ObservationMatrix::from_matrix(nalgebra::matrix![
            one, zero, zero, zero, zero;
            zero, zero, one, zero, zero
        ])
    }

    fn measurement_noise(&self) -> MeasurementCovariance<T, MEAS_DIM> {
        self.noise
    }
}
