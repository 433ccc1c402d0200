//! Extended Kalman Filter (EKF), used for the constant-turn mode
//!
//! The EKF handles the nonlinear coordinated-turn dynamics by linearizing
//! them around the current state estimate. The position sensor is linear, so
//! the measurement update is the ordinary Kalman update.
//!
//! # Reference
//!
//! Smith, G. L., Schmidt, S. F., & McGee, L. A. (1962). "Application of
//! Statistical Filter Theory to the Optimal Estimation of Position and Velocity
//! on Board a Circumlunar Vehicle." NASA Technical Report TR R-135.
//!
//! # Example
//!
//! ```
//! use immtrack::filters::ekf::{EkfState, ExtendedKalmanFilter};
//! use immtrack::models::{ConstantTurn, PositionSensor};
//! use immtrack::types::spaces::{Measurement, StateCovariance, StateVector};
//!
//! let transition = ConstantTurn::new(nalgebra::matrix![0.1, 0.0; 0.0, 0.1], 0.01);
//! let filter = ExtendedKalmanFilter::new(transition, PositionSensor::isotropic(5.0));
//!
//! // State: [x, vx, y, vy, omega]
//! let state = EkfState::new(
//!     StateVector::from_array([100.0, 10.0, 100.0, 5.0, 0.1]),
//!     StateCovariance::from_diagonal(&nalgebra::vector![100.0, 10.0, 100.0, 10.0, 0.01]),
//! );
//!
//! let predicted = filter.predict(&state, 0.1);
//! let updated = filter.update(&predicted, &Measurement::from_array([101.0, 100.5]));
//! assert!(updated.is_some());
//! ```

use core::marker::PhantomData;

use nalgebra::RealField;
use num_traits::Float;

use crate::models::{NonlinearTransitionModel, ObservationModel};
use crate::types::spaces::Measurement;

use super::kalman::{measurement_update, FilterCycle};

pub use super::kalman::KalmanState as EkfState;

// ============================================================================
// Extended Kalman Filter
// ============================================================================

/// An Extended Kalman Filter for nonlinear dynamics.
///
/// # Linearization
///
/// Prediction propagates the mean through the nonlinear transition f and the
/// covariance through the Jacobian F = df/dx evaluated at the prior mean.
#[derive(Debug, Clone)]
pub struct ExtendedKalmanFilter<T, Trans, Obs, const N: usize, const M: usize>
where
    T: RealField,
    Trans: NonlinearTransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
{
    /// Nonlinear transition (motion) model
    pub transition: Trans,
    /// Observation (sensor) model
    pub observation: Obs,
    _marker: PhantomData<T>,
}

impl<T, Trans, Obs, const N: usize, const M: usize> ExtendedKalmanFilter<T, Trans, Obs, N, M>
where
    T: RealField + Float + Copy,
    Trans: NonlinearTransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
{
    /// Creates a new Extended Kalman Filter with the given models.
    #[inline]
    pub fn new(transition: Trans, observation: Obs) -> Self {
        Self {
            transition,
            observation,
            _marker: PhantomData,
        }
    }

    /// Performs the EKF prediction step.
    ///
    /// - x_pred = f(x, dt)
    /// - P_pred = F * P * F^T + Q  where F = df/dx at x
    pub fn predict(&self, state: &EkfState<T, N>, dt: T) -> EkfState<T, N> {
        let predicted_mean = self.transition.predict_nonlinear(&state.mean, dt);
        let f = self.transition.jacobian_at(&state.mean, dt);
        let q = self.transition.process_noise(dt);

        EkfState {
            mean: predicted_mean,
            covariance: f.propagate_covariance(&state.covariance).add(&q),
        }
    }

    /// Performs the update step with a measurement.
    ///
    /// Returns `None` if the innovation covariance is singular.
    pub fn update(
        &self,
        state: &EkfState<T, N>,
        measurement: &Measurement<T, M>,
    ) -> Option<EkfState<T, N>> {
        self.correct(state.clone(), measurement)
            .map(|cycle| cycle.updated)
    }

    /// Runs a full predict/update cycle and keeps the intermediate results.
    pub fn cycle(
        &self,
        state: &EkfState<T, N>,
        dt: T,
        measurement: &Measurement<T, M>,
    ) -> Option<FilterCycle<T, N, M>> {
        let predicted = self.predict(state, dt);
        self.correct(predicted, measurement)
    }

    fn correct(
        &self,
        predicted: EkfState<T, N>,
        measurement: &Measurement<T, M>,
    ) -> Option<FilterCycle<T, N, M>> {
        let h = self.observation.observation_matrix();
        let r = self.observation.measurement_noise();
        measurement_update(predicted, measurement, &h, &r)
    }
}

// ============================================================================
// Tests
// ============================================================================
