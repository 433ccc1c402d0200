//! Linear Kalman filter, used for the constant-velocity mode
//!
//! A type-safe implementation of the discrete-time Kalman filter that leverages
//! the library's compile-time dimension and space checking.
//!
//! # Example
//!
//! ```
//! use immtrack::filters::kalman::{KalmanFilter, KalmanState};
//! use immtrack::models::{ConstantVelocity, PositionSensor};
//! use immtrack::types::spaces::{Measurement, StateCovariance, StateVector};
//!
//! let filter = KalmanFilter::new(ConstantVelocity::isotropic(0.5), PositionSensor::isotropic(2.0));
//!
//! // State: [x, vx, y, vy, omega]
//! let state = KalmanState::new(
//!     StateVector::from_array([0.0, 1.0, 0.0, 0.0, 0.0]),
//!     StateCovariance::from_diagonal(&nalgebra::vector![10.0, 1.0, 10.0, 1.0, 0.0]),
//! );
//!
//! let measurement = Measurement::from_array([1.2, -0.1]);
//! let cycle = filter.cycle(&state, 1.0, &measurement).unwrap();
//! assert!(cycle.updated.uncertainty() < cycle.predicted.uncertainty());
//! ```

use core::marker::PhantomData;

use nalgebra::RealField;
use num_traits::Float;

use crate::models::{ObservationModel, TransitionModel};
use crate::types::gaussian::innovation_density;
use crate::types::spaces::{
    ComputeInnovation, Innovation, Measurement, MeasurementCovariance, StateCovariance,
    StateVector,
};
use crate::types::transforms::{
    compute_innovation_covariance, compute_kalman_gain, joseph_update, ObservationMatrix,
};

// ============================================================================
// Kalman Filter State
// ============================================================================

/// State estimate for a single-model filter.
///
/// # Type Parameters
///
/// - `T`: Scalar type (typically `f32` or `f64`)
/// - `N`: State dimension (compile-time constant)
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanState<T: RealField, const N: usize> {
    /// State estimate mean
    pub mean: StateVector<T, N>,
    /// State estimate covariance
    pub covariance: StateCovariance<T, N>,
}

impl<T: RealField + Copy, const N: usize> KalmanState<T, N> {
    /// Creates a new Kalman filter state.
    #[inline]
    pub fn new(mean: StateVector<T, N>, covariance: StateCovariance<T, N>) -> Self {
        Self { mean, covariance }
    }

    /// Returns the trace of the covariance matrix (sum of variances).
    #[inline]
    pub fn uncertainty(&self) -> T {
        self.covariance.trace()
    }
}

impl<T: RealField + Copy> KalmanState<T, 5> {
    /// Position `[x, y]` of a `[x, vx, y, vy, omega]` state.
    #[inline]
    pub fn position(&self) -> [T; 2] {
        [*self.mean.index(0), *self.mean.index(2)]
    }
}

// ============================================================================
// Filter Cycle
// ============================================================================

/// Everything one predict/update cycle produces.
///
/// The IMM needs the prediction for the combined prediction output and the
/// innovation statistics for the mode likelihood, on top of the updated
/// estimate, so all of it is returned together.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCycle<T: RealField, const N: usize, const M: usize> {
    /// Predicted state (x-, P-)
    pub predicted: KalmanState<T, N>,
    /// Innovation z - H x-
    pub innovation: Innovation<T, M>,
    /// Symmetrized innovation covariance S
    pub innovation_cov: MeasurementCovariance<T, M>,
    /// Updated state (x+, P+)
    pub updated: KalmanState<T, N>,
}

impl<T: RealField + Copy, const N: usize, const M: usize> FilterCycle<T, N, M> {
    /// Gaussian density of the innovation, `None` if S is not positive definite.
    pub fn innovation_density(&self) -> Option<T> {
        innovation_density(&self.innovation, self.innovation_cov.as_matrix())
    }
}

/// Measurement update of a predicted state.
///
/// - y = z - H * x (innovation)
/// - S = H * P * H^T + R, symmetrized
/// - K = P * H^T * S^{-1}
/// - x_upd = x + K * y
/// - P_upd = (I - K*H) * P * (I - K*H)^T + K * R * K^T (Joseph form)
///
/// Returns `None` if the innovation covariance is singular.
pub fn measurement_update<T: RealField + Copy, const N: usize, const M: usize>(
    predicted: KalmanState<T, N>,
    measurement: &Measurement<T, M>,
    obs_matrix: &ObservationMatrix<T, M, N>,
    meas_noise: &MeasurementCovariance<T, M>,
) -> Option<FilterCycle<T, N, M>> {
    let predicted_meas = obs_matrix.observe(&predicted.mean);
    let innovation = measurement.innovation(predicted_meas);

    let innovation_cov =
        compute_innovation_covariance(&predicted.covariance, obs_matrix, meas_noise);
    let kalman_gain = compute_kalman_gain(&predicted.covariance, obs_matrix, &innovation_cov)?;

    let correction = kalman_gain.correct(&innovation);
    let updated_mean = predicted.mean + correction;
    let updated_cov = joseph_update(&predicted.covariance, &kalman_gain, obs_matrix, meas_noise);

    Some(FilterCycle {
        predicted,
        innovation,
        innovation_cov,
        updated: KalmanState {
            mean: updated_mean,
            covariance: updated_cov,
        },
    })
}

// ============================================================================
// Kalman Filter
// ============================================================================

/// A standard discrete-time Kalman filter.
///
/// # Type Parameters
///
/// - `T`: Scalar type
/// - `Trans`: Transition model type
/// - `Obs`: Observation model type
/// - `N`: State dimension
/// - `M`: Measurement dimension
#[derive(Debug, Clone)]
pub struct KalmanFilter<T, Trans, Obs, const N: usize, const M: usize>
where
    T: RealField,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
{
    /// Transition (motion) model
    pub transition: Trans,
    /// Observation (sensor) model
    pub observation: Obs,
    _marker: PhantomData<T>,
}

impl<T, Trans, Obs, const N: usize, const M: usize> KalmanFilter<T, Trans, Obs, N, M>
where
    T: RealField + Float + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
{
    /// Creates a new Kalman filter with the given models.
    #[inline]
    pub fn new(transition: Trans, observation: Obs) -> Self {
        Self {
            transition,
            observation,
            _marker: PhantomData,
        }
    }

    /// Performs the prediction step.
    ///
    /// - x_pred = F * x
    /// - P_pred = F * P * F^T + Q
    pub fn predict(&self, state: &KalmanState<T, N>, dt: T) -> KalmanState<T, N> {
        let f = self.transition.transition_matrix(dt);
        let q = self.transition.process_noise(dt);

        KalmanState {
            mean: f.apply_state(&state.mean),
            covariance: f.propagate_covariance(&state.covariance).add(&q),
        }
    }

    /// Performs the update step with a measurement.
    ///
    /// Returns `None` if the innovation covariance is singular.
    pub fn update(
        &self,
        state: &KalmanState<T, N>,
        measurement: &Measurement<T, M>,
    ) -> Option<KalmanState<T, N>> {
        self.correct(state.clone(), measurement)
            .map(|cycle| cycle.updated)
    }

    /// Runs a full predict/update cycle and keeps the intermediate results.
    pub fn cycle(
        &self,
        state: &KalmanState<T, N>,
        dt: T,
        measurement: &Measurement<T, M>,
    ) -> Option<FilterCycle<T, N, M>> {
        let predicted = self.predict(state, dt);
        self.correct(predicted, measurement)
    }

    fn correct(
        &self,
        predicted: KalmanState<T, N>,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConstantVelocity, PositionSensor};

    fn cv_filter() -> KalmanFilter<f64, ConstantVelocity<f64>, PositionSensor<f64>, 5, 2> {
        KalmanFilter::new(ConstantVelocity::isotropic(0.3), PositionSensor::isotropic(1.0))
    }

    #[test]
    fn test_kalman_predict() {
        let filter = cv_filter();

        // At origin, moving right at 10 m/s
        let state = KalmanState::new(
            StateVector::from_array([0.0, 10.0, 0.0, 0.0, 0.0]),
            StateCovariance::identity(),
        );

        let predicted = filter.predict(&state, 1.0);

        assert!((predicted.mean.index(0) - 10.0).abs() < 1e-10);
        assert!((predicted.mean.index(1) - 10.0).abs() < 1e-10);
        assert!(predicted.mean.index(2).abs() < 1e-10);
        // CV drops any turn-rate uncertainty
        assert!(predicted.covariance.as_matrix()[(4, 4)].abs() < 1e-15);
        assert!(predicted.covariance.as_matrix()[(0, 0)] > state.covariance.as_matrix()[(0, 0)]);
    }

    #[test]
    fn test_kalman_update_moves_toward_measurement() {
        let filter = cv_filter();
        let state = KalmanState::new(
            StateVector::from_array([0.0, 0.0, 0.0, 0.0, 0.0]),
            StateCovariance::from_matrix(nalgebra::SMatrix::<f64, 5, 5>::identity().scale(100.0)),
        );

        let updated = filter
            .update(&state, &Measurement::from_array([10.0, 5.0]))
            .unwrap();

        assert!(*updated.mean.index(0) > 5.0);
        assert!(*updated.mean.index(2) > 2.0);
        assert!(updated.uncertainty() < state.uncertainty());
    }

    #[test]
    fn test_cycle_reports_innovation_statistics() {
        let filter = cv_filter();
        let state = KalmanState::new(
            StateVector::from_array([0.0, 10.0, 0.0, 5.0, 0.0]),
            StateCovariance::identity(),
        );
        let measurement = Measurement::from_array([11.0, 4.0]);

        let cycle = filter.cycle(&state, 1.0, &measurement).unwrap();

        assert_eq!(cycle.predicted.position(), [10.0, 5.0]);
        assert!((cycle.innovation.index(0) - 1.0).abs() < 1e-12);
        assert!((cycle.innovation.index(1) + 1.0).abs() < 1e-12);
        assert!(cycle.innovation_cov.asymmetry() < 1e-15);
        // S = P_pred[pos] + R, with R = I
        let s00 = cycle.predicted.covariance.as_matrix()[(0, 0)] + 1.0;
        assert!((cycle.innovation_cov.as_matrix()[(0, 0)] - s00).abs() < 1e-12);

        let [x, y] = cycle.updated.position();
        assert!(x > 10.0 && x < 11.0);
        assert!(y < 5.0 && y > 4.0);
    }

    #[test]
    fn test_closer_measurement_is_more_likely() {
        let filter = cv_filter();
        let state = KalmanState::new(
            StateVector::from_array([10.0, 0.0, 5.0, 0.0, 0.0]),
            StateCovariance::identity(),
        );

        let close = filter
            .cycle(&state, 1.0, &Measurement::from_array([10.0, 5.0]))
            .unwrap();
        let far = filter
            .cycle(&state, 1.0, &Measurement::from_array([40.0, 40.0]))
            .unwrap();

        assert!(close.innovation_density().unwrap() > far.innovation_density().unwrap());
    }

    #[test]
    fn test_singular_innovation_covariance() {
        let h = ObservationMatrix::from_matrix(nalgebra::matrix![
            1.0, 0.0, 0.0, 0.0, 0.0_f64;
            0.0, 0.0, 1.0, 0.0, 0.0
        ]);
        let r = MeasurementCovariance::<f64, 2>::zeros();
        let state = KalmanState::new(StateVector::zeros(), StateCovariance::zeros());

        assert!(measurement_update(state, &Measurement::from_array([1.0, 1.0]), &h, &r).is_none());
    }

    #[test]
    fn test_updated_covariance_stays_symmetric() {
        let filter = cv_filter();
        let mut p = nalgebra::SMatrix::<f64, 5, 5>::identity().scale(5.0);
        p[(0, 1)] = 1.0;
        p[(1, 0)] = 1.0;
        p[(2, 3)] = -0.5;
        p[(3, 2)] = -0.5;
        let mut state = KalmanState::new(StateVector::zeros(), StateCovariance::from_matrix(p));

        for k in 0..50 {
            let z = Measurement::from_array([k as f64, -(k as f64) * 0.5]);
            state = filter.cycle(&state, 1.0, &z).unwrap().updated;
        }

        assert!(state.covariance.asymmetry() < 1e-10);
        let eigen = state.covariance.as_matrix().symmetric_eigenvalues();
        assert!(eigen.iter().all(|&l| l > -1e-10));
    }
}
