//! Transition (motion) models for the IMM filter bank
//!
//! Both models share the state layout `[x, vx, y, vy, omega]` and the same
//! acceleration input matrix G. The constant-velocity model is linear and
//! ignores the turn-rate slot; the constant-turn model is nonlinear in the
//! turn rate and is linearized through its Jacobian.

use core::fmt;

use nalgebra::RealField;
use num_traits::Float;

use crate::types::spaces::{DisturbanceCovariance, StateCovariance, StateVector};
use crate::types::transforms::{NoiseInputMatrix, TransitionMatrix};
use crate::{ImmError, Result};

/// Dimension of the state vector `[x, vx, y, vy, omega]`.
pub const STATE_DIM: usize = 5;

/// Dimension of the acceleration disturbance `[ax, ay]`.
pub const DISTURBANCE_DIM: usize = 2;

/// Index of the turn rate in the state vector.
pub const TURN_RATE_INDEX: usize = 4;

/// Turn rates with magnitude below this (rad/s) take the straight-line branch.
pub const ZERO_TURN_RATE: f64 = 1e-9;

/// Trait for linear transition models.
///
/// x_{k+1} = F * x_k + G * w,  w ~ N(0, Q)
pub trait TransitionModel<T: RealField, const N: usize> {
    /// Returns the state transition matrix for time step dt.
    fn transition_matrix(&self, dt: T) -> TransitionMatrix<T, N>;

    /// Returns the process noise covariance G * Q * G^T (plus any extra terms).
    fn process_noise(&self, dt: T) -> StateCovariance<T, N>;
}

/// Trait for nonlinear transition models used by the extended Kalman filter.
pub trait NonlinearTransitionModel<T: RealField, const N: usize> {
    /// Propagates a state through the nonlinear dynamics.
    fn predict_nonlinear(&self, state: &StateVector<T, N>, dt: T) -> StateVector<T, N>;

    /// Jacobian of `predict_nonlinear` with respect to the full state.
    fn jacobian_at(&self, state: &StateVector<T, N>, dt: T) -> TransitionMatrix<T, N>;

    /// Returns the process noise covariance for time step dt.
    fn process_noise(&self, dt: T) -> StateCovariance<T, N>;
}

// ============================================================================
// Mode selection
// ============================================================================

/// The two motion modes of the filter bank, indexed as in the mode
/// probability vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MotionMode {
    ConstantVelocity,
    ConstantTurn,
}

impl MotionMode {
    /// Both modes, in index order.
    pub const ALL: [MotionMode; 2] = [MotionMode::ConstantVelocity, MotionMode::ConstantTurn];

    /// Resolves a raw mode index.
    ///
    /// Any index other than 0 (CV) or 1 (CT) is a configuration error: the
    /// filter bank is built for exactly these two models.
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(MotionMode::ConstantVelocity),
            1 => Ok(MotionMode::ConstantTurn),
            _ => Err(ImmError::UnknownMode { index }),
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            MotionMode::ConstantVelocity => 0,
            MotionMode::ConstantTurn => 1,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            MotionMode::ConstantVelocity => "CV",
            MotionMode::ConstantTurn => "CT",
        }
    }
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ============================================================================
// Shared pieces
// ============================================================================

/// Acceleration input matrix G mapping `[ax, ay]` into the state.
///
/// ```text
/// [dt^2/2  0     ]
/// [dt      0     ]
/// [0       dt^2/2]
/// [0       dt    ]
/// [0       0     ]
/// ```
pub fn noise_input_matrix<T: RealField + Copy>(dt: T) -> NoiseInputMatrix<T, STATE_DIM, DISTURBANCE_DIM> {
    let zero = T::zero();
    let half_dt2 = dt * dt / (T::one() + T::one());

    NoiseInputMatrix::from_matrix(nalgebra::matrix![
        half_dt2, zero;
        dt, zero;
        zero, half_dt2;
        zero, dt;
        zero, zero
    ])
}

fn assert_valid_disturbance<T: RealField + Copy>(q: &DisturbanceCovariance<T, DISTURBANCE_DIM>) {
    let m = q.as_matrix();
    assert!(
        m[(0, 0)] >= T::zero() && m[(1, 1)] >= T::zero(),
        "Process noise variances must be non-negative"
    );
    assert!(
        m[(0, 1)] == m[(1, 0)],
        "Process noise covariance must be symmetric"
    );
    assert!(
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)] >= T::zero(),
        "Process noise covariance must be positive semi-definite"
    );
}

#[inline]
fn is_zero_turn_rate<T: RealField + Float + Copy>(omega: T) -> bool {
    let threshold: T = nalgebra::convert(ZERO_TURN_RATE);
    Float::abs(omega) < threshold
}

/// Constant-velocity transition matrix over `dt`.
///
/// The turn-rate row and column are zero: the CV estimate carries no turn rate.
pub fn constant_velocity_matrix<T: RealField + Copy>(dt: T) -> TransitionMatrix<T, STATE_DIM> {
    let one = T::one();
    let zero = T::zero();

    TransitionMatrix::from_matrix(nalgebra::matrix![
        one, dt, zero, zero, zero;
        zero, one, zero, zero, zero;
        zero, zero, one, dt, zero;
        zero, zero, zero, one, zero;
        zero, zero, zero, zero, zero
    ])
}

/// Coordinated-turn transition matrix for turn rate `omega` over `dt`.
///
/// At zero turn rate the position/velocity block equals the CV matrix and the
/// turn rate is carried forward unchanged.
pub fn constant_turn_matrix<T: RealField + Float + Copy>(omega: T, dt: T) -> TransitionMatrix<T, STATE_DIM> {
    let one = T::one();
    let zero = T::zero();

    if is_zero_turn_rate(omega) {
        return TransitionMatrix::from_matrix(nalgebra::matrix![
            one, dt, zero, zero, zero;
            zero, one, zero, zero, zero;
            zero, zero, one, dt, zero;
            zero, zero, zero, one, zero;
            zero, zero, zero, zero, one
        ]);
    }

    let wt = omega * dt;
    let s = Float::sin(wt);
    let c = Float::cos(wt);
    let s_w = s / omega;
    let c_w = (one - c) / omega;

    TransitionMatrix::from_matrix(nalgebra::matrix![
        one, s_w, zero, -c_w, zero;
        zero, c, zero, -s, zero;
        zero, c_w, one, s_w, zero;
        zero, s, zero, c, zero;
        zero, zero, zero, zero, one
    ])
}

// ============================================================================
// Constant velocity
// ============================================================================

/// Nearly constant velocity model driven by white acceleration noise.
///
/// State: `[x, vx, y, vy, omega]`, with `omega` structurally zero.
#[derive(Debug, Clone)]
pub struct ConstantVelocity<T: RealField> {
    /// Acceleration disturbance covariance Q (2x2)
    pub disturbance: DisturbanceCovariance<T, DISTURBANCE_DIM>,
}

impl<T: RealField + Float + Copy> ConstantVelocity<T> {
    /// Creates a CV model with acceleration covariance `q`.
    ///
    /// # Panics
    /// Panics if `q` has negative variances or is not symmetric.
    pub fn new(q: nalgebra::SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>) -> Self {
        let disturbance = DisturbanceCovariance::from_matrix(q);
        assert_valid_disturbance(&disturbance);
        Self { disturbance }
    }

    /// Creates a CV model with the same acceleration variance on both axes.
    pub fn isotropic(sigma_a: T) -> Self {
        assert!(sigma_a >= T::zero(), "Acceleration sigma_a must be non-negative");
        let var = sigma_a * sigma_a;
        Self::new(nalgebra::matrix![var, T::zero(); T::zero(), var])
    }
}

impl<T: RealField + Float + Copy> TransitionModel<T, STATE_DIM> for ConstantVelocity<T> {
    fn transition_matrix(&self, dt: T) -> TransitionMatrix<T, STATE_DIM> {
        assert!(dt >= T::zero(), "Time step dt must be non-negative");
        constant_velocity_matrix(dt)
    }

    fn process_noise(&self, dt: T) -> StateCovariance<T, STATE_DIM> {
        assert!(dt >= T::zero(), "Time step dt must be non-negative");
        noise_input_matrix(dt).project_disturbance(&self.disturbance)
    }
}

// ============================================================================
// Constant turn
// ============================================================================

/// Nearly constant turn rate model in 2D.
///
/// State: `[x, vx, y, vy, omega]`. The nonlinear dynamics rotate the velocity
/// by `omega * dt` and integrate position along the arc:
///
/// ```text
/// x'  = x + vx sin(wT)/w - vy (1 - cos(wT))/w
/// vx' = vx cos(wT) - vy sin(wT)
/// y'  = y + vx (1 - cos(wT))/w + vy sin(wT)/w
/// vy' = vx sin(wT) + vy cos(wT)
/// w'  = w
/// ```
#[derive(Debug, Clone)]
pub struct ConstantTurn<T: RealField> {
    /// Acceleration disturbance covariance Q (2x2)
    pub disturbance: DisturbanceCovariance<T, DISTURBANCE_DIM>,
    /// Turn-rate process variance; enters the covariance as dt^2 * variance
    pub turn_rate_variance: T,
}

impl<T: RealField + Float + Copy> ConstantTurn<T> {
    /// Creates a CT model.
    ///
    /// # Panics
    /// Panics if `q` is not a valid covariance or `turn_rate_variance < 0`.
    pub fn new(q: nalgebra::SMatrix<T, DISTURBANCE_DIM, DISTURBANCE_DIM>, turn_rate_variance: T) -> Self {
        let disturbance = DisturbanceCovariance::from_matrix(q);
        assert_valid_disturbance(&disturbance);
        assert!(
            turn_rate_variance >= T::zero(),
            "Turn-rate variance must be non-negative"
        );
        Self {
            disturbance,
            turn_rate_variance,
        }
    }

    /// Transition matrix F(omega) for the turn rate stored in `state`.
    pub fn transition_matrix_at(&self, state: &StateVector<T, STATE_DIM>, dt: T) -> TransitionMatrix<T, STATE_DIM> {
        constant_turn_matrix(*state.index(TURN_RATE_INDEX), dt)
    }
}

impl<T: RealField + Float + Copy> NonlinearTransitionModel<T, STATE_DIM> for ConstantTurn<T> {
    fn predict_nonlinear(&self, state: &StateVector<T, STATE_DIM>, dt: T) -> StateVector<T, STATE_DIM> {
        assert!(dt >= T::zero(), "Time step dt must be non-negative");
        // The dynamics are linear in [x, vx, y, vy] for a fixed omega
        self.transition_matrix_at(state, dt).apply_state(state)
    }

    fn jacobian_at(&self, state: &StateVector<T, STATE_DIM>, dt: T) -> TransitionMatrix<T, STATE_DIM> {
        assert!(dt >= T::zero(), "Time step dt must be non-negative");
        let vx = *state.index(1);
        let vy = *state.index(3);
        let omega = *state.index(TURN_RATE_INDEX);

        let mut jacobian = constant_turn_matrix(omega, dt).into_matrix();

        if is_zero_turn_rate(omega) {
            // Limits of the omega-column as omega -> 0
            let half_dt2 = dt * dt / (T::one() + T::one());
            jacobian[(0, 4)] = -vy * half_dt2;
            jacobian[(1, 4)] = -dt * vy;
            jacobian[(2, 4)] = vx * half_dt2;
            jacobian[(3, 4)] = dt * vx;
        } else {
            let wt = omega * dt;
            let s = Float::sin(wt);
            let c = Float::cos(wt);
            let omega_sq = omega * omega;

            // d(sin(wT)/w)/dw and d((1 - cos(wT))/w)/dw
            let d_sin_term = (wt * c - s) / omega_sq;
            let d_cos_term = (wt * s - (T::one() - c)) / omega_sq;

            jacobian[(0, 4)] = vx * d_sin_term - vy * d_cos_term;
            jacobian[(1, 4)] = -dt * (s * vx + c * vy);
            jacobian[(2, 4)] = vx * d_cos_term + vy * d_sin_term;
            jacobian[(3, 4)] = dt * (c * vx - s * vy);
        }

        TransitionMatrix::from_matrix(jacobian)
    }

    fn process_noise(&self, dt: T) -> StateCovariance<T, STATE_DIM> {
        assert!(dt >= T::zero(), "Time step dt must be non-negative");
        let mut q = *noise_input_matrix(dt)
            .project_disturbance(&self.disturbance)
            .as_matrix();
        q[(TURN_RATE_INDEX, TURN_RATE_INDEX)] += dt * dt * self.turn_rate_variance;
        StateCovariance::from_matrix(q)
    }
}
