//! IMM configuration
//!
//! Everything the estimator needs that stays fixed for a whole run: sampling
//! interval, Markov mode-switching matrix, per-mode noise, sensor noise,
//! likelihood floor and the initial condition.

use nalgebra::{RealField, SMatrix};
use num_traits::Float;

use crate::filters::kalman::KalmanState;
use crate::models::{MotionMode, DISTURBANCE_DIM, MEAS_DIM, STATE_DIM};
use crate::types::gaussian::DEFAULT_LIKELIHOOD_FLOOR;
use crate::types::spaces::{StateCovariance, StateVector};
use crate::{ImmError, Result};

/// Number of modes in the bank.
pub const NUM_MODES: usize = 2;

/// Tolerance on the row sums of the mode transition matrix and on the sum of
/// the initial mode probabilities.
pub const STOCHASTIC_TOLERANCE: f64 = 1e-9;

fn invalid(name: &'static str, reason: &'static str) -> ImmError {
    ImmError::InvalidParameter { name, reason }
}

fn all_finite<T: RealField + Float + Copy>(m: &SMatrix<T, 2, 2>) -> bool {
    m.iter().all(|&v| Float::is_finite(v))
}

/// `m00 * m11 - m01 * m10`
fn determinant_2x2<T: RealField + Float + Copy>(m: &SMatrix<T, 2, 2>) -> T {
    m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]
}

// ============================================================================
// Mode transition matrix
// ============================================================================

/// Row-stochastic Markov matrix: entry `(i, j)` is the probability of
/// switching from mode i to mode j between two time steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeTransitionMatrix<T: RealField> {
    inner: SMatrix<T, NUM_MODES, NUM_MODES>,
}

impl<T: RealField + Float + Copy> ModeTransitionMatrix<T> {
    /// Validates and wraps a 2x2 matrix.
    pub fn new(inner: SMatrix<T, NUM_MODES, NUM_MODES>) -> Result<Self> {
        let tolerance: T = nalgebra::convert(STOCHASTIC_TOLERANCE);

        for i in 0..NUM_MODES {
            let mut row_sum = T::zero();
            for j in 0..NUM_MODES {
                let p = inner[(i, j)];
                if !Float::is_finite(p) || p < T::zero() || p > T::one() {
                    return Err(invalid("mode_transition", "entries must lie in [0, 1]"));
                }
                row_sum += p;
            }
            if Float::abs(row_sum - T::one()) > tolerance {
                return Err(invalid("mode_transition", "rows must sum to 1"));
            }
        }

        Ok(Self { inner })
    }

    /// Builds the matrix from its rows.
    pub fn from_rows(rows: [[T; NUM_MODES]; NUM_MODES]) -> Result<Self> {
        Self::new(nalgebra::matrix![
            rows[0][0], rows[0][1];
            rows[1][0], rows[1][1]
        ])
    }

    /// Symmetric chain that stays in the current mode with probability `p_stay`.
    pub fn sticky(p_stay: T) -> Result<Self> {
        let p_switch = T::one() - p_stay;
        Self::from_rows([[p_stay, p_switch], [p_switch, p_stay]])
    }

    /// Identity chain: modes never switch.
    pub fn identity() -> Self {
        Self {
            inner: SMatrix::identity(),
        }
    }

    /// Probability of switching from mode `from` to mode `to`.
    #[inline]
    pub fn probability(&self, from: MotionMode, to: MotionMode) -> T {
        self.inner[(from.index(), to.index())]
    }

    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, NUM_MODES, NUM_MODES> {
        &self.inner
    }
}

// ============================================================================
// Initial state prior
// ============================================================================

/// Gaussian prior over `[x, vx, y, vy, omega]`, shared by both modes at k = 0.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialStatePrior<T: RealField> {
    pub mean: StateVector<T, STATE_DIM>,
    pub covariance: StateCovariance<T, STATE_DIM>,
}

impl<T: RealField + Float + Copy> InitialStatePrior<T> {
    /// Builds a diagonal prior from per-quantity means and variances.
    ///
    /// Position and velocity variances apply to both axes.
    pub fn from_moments(
        position_mean: [T; 2],
        velocity_mean: [T; 2],
        turn_rate_mean: T,
        position_variance: T,
        velocity_variance: T,
        turn_rate_variance: T,
    ) -> Self {
        Self {
            mean: StateVector::from_array([
                position_mean[0],
                velocity_mean[0],
                position_mean[1],
                velocity_mean[1],
                turn_rate_mean,
            ]),
            covariance: StateCovariance::from_diagonal(&nalgebra::vector![
                position_variance,
                velocity_variance,
                position_variance,
                velocity_variance,
                turn_rate_variance
            ]),
        }
    }

    /// The prior as a filter state.
    pub fn to_state(&self) -> KalmanState<T, STATE_DIM> {
        KalmanState::new(self.mean, self.covariance)
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Fixed configuration of an IMM run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmParameters<T: RealField> {
    /// Sampling interval T (seconds)
    pub dt: T,
    /// Markov mode transition matrix
    pub transition: ModeTransitionMatrix<T>,
    /// Acceleration covariance Q of the CV mode
    pub cv_process_noise: SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>,
    /// Acceleration covariance Q of the CT mode
    pub ct_process_noise: SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>,
    /// Turn-rate process variance of the CT mode
    pub turn_rate_variance: T,
    /// Position measurement noise R
    pub measurement_noise: SMatrix<T, MEAS_DIM, MEAS_DIM>,
    /// Lower bound applied to every mode likelihood
    pub likelihood_floor: T,
    /// Mode probabilities at k = 0, indexed by [`MotionMode::index`]
    pub initial_mode_probabilities: [T; NUM_MODES],
    /// Initial state of both modes
    pub prior: InitialStatePrior<T>,
}

impl<T: RealField + Float + Copy> ImmParameters<T> {
    /// Creates parameters with a shared process noise for both modes, zero
    /// turn-rate variance, uniform initial mode probabilities and the default
    /// likelihood floor.
    pub fn new(
        dt: T,
        transition: ModeTransitionMatrix<T>,
        process_noise: SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>,
        measurement_noise: SMatrix<T, MEAS_DIM, MEAS_DIM>,
        prior: InitialStatePrior<T>,
    ) -> Self {
        let modes: T = nalgebra::convert(NUM_MODES as f64);
        let uniform = T::one() / modes;
        Self {
            dt,
            transition,
            cv_process_noise: process_noise,
            ct_process_noise: process_noise,
            turn_rate_variance: T::zero(),
            measurement_noise,
            likelihood_floor: nalgebra::convert(DEFAULT_LIKELIHOOD_FLOOR),
            initial_mode_probabilities: [uniform; NUM_MODES],
            prior,
        }
    }

    pub fn with_turn_rate_variance(mut self, variance: T) -> Self {
        self.turn_rate_variance = variance;
        self
    }

    pub fn with_cv_process_noise(mut self, q: SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>) -> Self {
        self.cv_process_noise = q;
        self
    }

    pub fn with_ct_process_noise(mut self, q: SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>) -> Self {
        self.ct_process_noise = q;
        self
    }

    pub fn with_likelihood_floor(mut self, floor: T) -> Self {
        self.likelihood_floor = floor;
        self
    }

    pub fn with_initial_mode_probabilities(mut self, probabilities: [T; NUM_MODES]) -> Self {
        self.initial_mode_probabilities = probabilities;
        self
    }

    /// Process noise of the given mode.
    pub fn process_noise(&self, mode: MotionMode) -> &SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM> {
        match mode {
            MotionMode::ConstantVelocity => &self.cv_process_noise,
            MotionMode::ConstantTurn => &self.ct_process_noise,
        }
    }

    /// Checks every parameter that the model constructors would otherwise
    /// reject with a panic, plus the probability constraints.
    pub fn validate(&self) -> Result<()> {
        if !(Float::is_finite(self.dt) && self.dt > T::zero()) {
            return Err(invalid("dt", "sampling interval must be positive"));
        }

        // Re-run the stochastic checks in case the fields were edited directly
        ModeTransitionMatrix::new(*self.transition.as_matrix())?;

        for mode in MotionMode::ALL {
            let q = self.process_noise(mode);
            if !all_finite(q) {
                return Err(invalid("process_noise", "entries must be finite"));
            }
            if q[(0, 0)] < T::zero() || q[(1, 1)] < T::zero() || q[(0, 1)] != q[(1, 0)] {
                return Err(invalid(
                    "process_noise",
                    "must be symmetric with non-negative variances",
                ));
            }
            if determinant_2x2(q) < T::zero() {
                return Err(invalid("process_noise", "must be positive semi-definite"));
            }
        }

        if !(Float::is_finite(self.turn_rate_variance) && self.turn_rate_variance >= T::zero()) {
            return Err(invalid("turn_rate_variance", "must be non-negative"));
        }

        let r = &self.measurement_noise;
        if !all_finite(r) {
            return Err(invalid("measurement_noise", "entries must be finite"));
        }
        if !(r[(0, 0)] > T::zero() && r[(1, 1)] > T::zero()) || r[(0, 1)] != r[(1, 0)] {
            return Err(invalid(
                "measurement_noise",
                "must be symmetric with positive variances",
            ));
        }
        if !(determinant_2x2(r) > T::zero()) {
            return Err(invalid("measurement_noise", "must be positive definite"));
        }

        if !(self.likelihood_floor > T::zero()) {
            return Err(invalid("likelihood_floor", "must be positive"));
        }

        let tolerance: T = nalgebra::convert(STOCHASTIC_TOLERANCE);
        let mut total = T::zero();
        for &p in &self.initial_mode_probabilities {
            if !(p >= T::zero() && p <= T::one()) {
                return Err(invalid(
                    "initial_mode_probabilities",
                    "entries must lie in [0, 1]",
                ));
            }
            total += p;
        }
        if Float::abs(total - T::one()) > tolerance {
            return Err(invalid("initial_mode_probabilities", "must sum to 1"));
        }

        let p0 = self.prior.covariance.as_matrix();
        for i in 0..STATE_DIM {
            if !(Float::is_finite(p0[(i, i)]) && p0[(i, i)] >= T::zero()) {
                return Err(invalid("prior", "variances must be non-negative"));
            }
        }

        Ok(())
    }
}
