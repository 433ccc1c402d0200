//! The IMM recursion
//!
//! One [`ImmEstimator::step`] per measurement runs, in order: mode mixing,
//! per-mode predict/update, likelihood evaluation, mode probability update
//! and state combination. The per-mode records live in a fixed two-element
//! bank that is overwritten in place.

use alloc::vec::Vec;

use nalgebra::RealField;
use num_traits::Float;

use crate::filters::ekf::ExtendedKalmanFilter;
use crate::filters::kalman::{FilterCycle, KalmanFilter, KalmanState};
use crate::models::{
    ConstantTurn, ConstantVelocity, MotionMode, PositionSensor, MEAS_DIM, STATE_DIM,
    TURN_RATE_INDEX,
};
use crate::types::spaces::{Measurement, StateVector};
use crate::{ImmError, Result};

use super::combine::{combine_estimates, combine_predictions};
use super::mixing::mix_estimates;
use super::params::{ImmParameters, NUM_MODES};
use super::probability::{mode_likelihood, update_mode_probabilities, ModeLikelihood};

/// Linear Kalman filter of the constant-velocity mode.
pub type CvFilter<T> = KalmanFilter<T, ConstantVelocity<T>, PositionSensor<T>, STATE_DIM, MEAS_DIM>;

/// Extended Kalman filter of the constant-turn mode.
pub type CtFilter<T> =
    ExtendedKalmanFilter<T, ConstantTurn<T>, PositionSensor<T>, STATE_DIM, MEAS_DIM>;

/// Per-mode record of the filter bank.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeFilterState<T: RealField> {
    pub mode: MotionMode,
    /// Updated estimate (x+, P+) of the last step, or the prior before the first
    pub estimate: KalmanState<T, STATE_DIM>,
    /// Prediction (x-, P-) of the last step, or the prior before the first
    pub predicted: KalmanState<T, STATE_DIM>,
    /// Likelihood of the last measurement under this mode
    pub likelihood: ModeLikelihood<T>,
}

impl<T: RealField + Float + Copy> ModeFilterState<T> {
    fn from_prior(mode: MotionMode, prior: KalmanState<T, STATE_DIM>) -> Self {
        Self {
            mode,
            estimate: prior.clone(),
            predicted: prior,
            likelihood: ModeLikelihood {
                value: T::one(),
                floored: false,
            },
        }
    }

    /// Turn-rate component of this mode's estimate.
    #[inline]
    pub fn turn_rate(&self) -> T {
        *self.estimate.mean.index(TURN_RATE_INDEX)
    }
}

/// What one IMM step produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmStepOutput<T: RealField> {
    /// Zero-based index of the step
    pub step: usize,
    /// Combined estimate and its covariance (current-step probabilities)
    pub estimate: KalmanState<T, STATE_DIM>,
    /// Combined one-step prediction (previous-step probabilities)
    pub prediction: StateVector<T, STATE_DIM>,
    /// Mode probabilities after this step's update
    pub mode_probabilities: [T; NUM_MODES],
    /// Per-mode likelihoods of this step's measurement
    pub likelihoods: [ModeLikelihood<T>; NUM_MODES],
    /// Per-mode updated means, indexed by [`MotionMode::index`]
    pub mode_estimates: [StateVector<T, STATE_DIM>; NUM_MODES],
}

impl<T: RealField + Float + Copy> ImmStepOutput<T> {
    /// Combined turn-rate estimate.
    #[inline]
    pub fn turn_rate(&self) -> T {
        *self.estimate.mean.index(TURN_RATE_INDEX)
    }

    /// Turn-rate estimate of the constant-turn filter alone.
    #[inline]
    pub fn ct_turn_rate(&self) -> T {
        *self.mode_estimates[MotionMode::ConstantTurn.index()].index(TURN_RATE_INDEX)
    }

    #[inline]
    pub fn estimated_position(&self) -> [T; 2] {
        self.estimate.position()
    }

    #[inline]
    pub fn predicted_position(&self) -> [T; 2] {
        [*self.prediction.index(0), *self.prediction.index(2)]
    }
}

// ============================================================================
// Estimator
// ============================================================================

/// Two-mode (CV/CT) Interacting Multiple Model estimator.
///
/// # Example
///
/// ```
/// use immtrack::imm::{ImmEstimator, ImmParameters, InitialStatePrior, ModeTransitionMatrix};
/// use immtrack::types::spaces::Measurement;
///
/// let params = ImmParameters::new(
///     1.0,
///     ModeTransitionMatrix::sticky(0.95).unwrap(),
///     nalgebra::matrix![0.1, 0.0; 0.0, 0.1],
///     nalgebra::matrix![1.0, 0.0; 0.0, 1.0],
///     InitialStatePrior::from_moments([0.0, 0.0], [0.0, 0.0], 0.0, 100.0, 10.0, 0.01),
/// )
/// .with_turn_rate_variance(1e-4);
///
/// let mut imm = ImmEstimator::new(params).unwrap();
/// let out = imm.step(&Measurement::from_array([1.0, 0.5])).unwrap();
/// let total: f64 = out.mode_probabilities.iter().sum();
/// assert!((total - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct ImmEstimator<T: RealField + Float + Copy> {
    params: ImmParameters<T>,
    cv: CvFilter<T>,
    ct: CtFilter<T>,
    bank: [ModeFilterState<T>; NUM_MODES],
    probabilities: [T; NUM_MODES],
    steps: usize,
}

impl<T: RealField + Float + Copy> ImmEstimator<T> {
    /// Validates the parameters and builds the filter bank at the prior.
    pub fn new(params: ImmParameters<T>) -> Result<Self> {
        params.validate()?;

        let sensor = PositionSensor::new(params.measurement_noise);
        let cv = KalmanFilter::new(
            ConstantVelocity::new(*params.process_noise(MotionMode::ConstantVelocity)),
            sensor.clone(),
        );
        let ct = ExtendedKalmanFilter::new(
            ConstantTurn::new(
                *params.process_noise(MotionMode::ConstantTurn),
                params.turn_rate_variance,
            ),
            sensor,
        );

        let prior = params.prior.to_state();
        let bank = MotionMode::ALL.map(|mode| ModeFilterState::from_prior(mode, prior.clone()));
        let probabilities = params.initial_mode_probabilities;

        Ok(Self {
            params,
            cv,
            ct,
            bank,
            probabilities,
            steps: 0,
        })
    }

    /// Returns to the prior and the initial mode probabilities.
    pub fn reset(&mut self) {
        let prior = self.params.prior.to_state();
        self.bank = MotionMode::ALL.map(|mode| ModeFilterState::from_prior(mode, prior.clone()));
        self.probabilities = self.params.initial_mode_probabilities;
        self.steps = 0;
    }

    #[inline]
    pub fn params(&self) -> &ImmParameters<T> {
        &self.params
    }

    /// Current mode probabilities, indexed by [`MotionMode::index`].
    #[inline]
    pub fn mode_probabilities(&self) -> &[T; NUM_MODES] {
        &self.probabilities
    }

    #[inline]
    pub fn bank(&self) -> &[ModeFilterState<T>; NUM_MODES] {
        &self.bank
    }

    /// Per-mode record for a raw mode index.
    pub fn mode_state(&self, index: usize) -> Result<&ModeFilterState<T>> {
        let mode = MotionMode::from_index(index)?;
        Ok(&self.bank[mode.index()])
    }

    /// Number of measurements processed since construction or reset.
    #[inline]
    pub fn steps_processed(&self) -> usize {
        self.steps
    }

    /// Processes one measurement.
    ///
    /// A singular innovation covariance in either mode aborts the step with
    /// [`ImmError::SingularMatrix`] and leaves the estimator unchanged.
    pub fn step(&mut self, measurement: &Measurement<T, MEAS_DIM>) -> Result<ImmStepOutput<T>> {
        let previous_probabilities = self.probabilities;
        let estimates = [self.bank[0].estimate.clone(), self.bank[1].estimate.clone()];

        let mixed = mix_estimates(&estimates, &self.params.transition, &previous_probabilities);

        let [cv_cycle, ct_cycle] = [
            self.cycle(MotionMode::ConstantVelocity, &mixed.initial[0], measurement)?,
            self.cycle(MotionMode::ConstantTurn, &mixed.initial[1], measurement)?,
        ];

        let floor = self.params.likelihood_floor;
        let likelihoods = [
            mode_likelihood(&cv_cycle, floor),
            mode_likelihood(&ct_cycle, floor),
        ];
        for (mode, likelihood) in MotionMode::ALL.iter().zip(likelihoods.iter()) {
            if likelihood.floored {
                log::trace!("step {}: {} likelihood floored at {:?}", self.steps, mode, floor);
            }
        }

        let probabilities = update_mode_probabilities(
            &likelihoods.map(|l| l.value),
            &mixed.normalizers,
        );

        let updated = [cv_cycle.updated, ct_cycle.updated];
        let predicted = [cv_cycle.predicted, ct_cycle.predicted];

        let estimate = combine_estimates(&updated, &probabilities);
        let prediction = combine_predictions(&predicted, &previous_probabilities);

        let output = ImmStepOutput {
            step: self.steps,
            estimate,
            prediction,
            mode_probabilities: probabilities,
            likelihoods,
            mode_estimates: [updated[0].mean, updated[1].mean],
        };

        log::trace!(
            "step {}: mu = [{:?}, {:?}]",
            self.steps,
            probabilities[0],
            probabilities[1]
        );

        for (j, record) in self.bank.iter_mut().enumerate() {
            record.estimate = updated[j].clone();
            record.predicted = predicted[j].clone();
            record.likelihood = likelihoods[j];
        }
        self.probabilities = probabilities;
        self.steps += 1;

        Ok(output)
    }

    /// Processes a whole measurement sequence from the current state.
    pub fn run(&mut self, measurements: &[Measurement<T, MEAS_DIM>]) -> Result<Vec<ImmStepOutput<T>>> {
        measurements.iter().map(|z| self.step(z)).collect()
    }

    fn cycle(
        &self,
        mode: MotionMode,
        initial: &KalmanState<T, STATE_DIM>,
        measurement: &Measurement<T, MEAS_DIM>,
    ) -> Result<FilterCycle<T, STATE_DIM, MEAS_DIM>> {
        let dt = self.params.dt;
        let cycle = match mode {
            MotionMode::ConstantVelocity => self.cv.cycle(initial, dt, measurement),
            MotionMode::ConstantTurn => self.ct.cycle(initial, dt, measurement),
        };
        cycle.ok_or_else(|| ImmError::SingularMatrix {
            context: match mode {
                MotionMode::ConstantVelocity => "CV innovation covariance",
                MotionMode::ConstantTurn => "CT innovation covariance",
            },
        })
    }
}
