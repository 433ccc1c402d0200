//! Seeded synthetic scenarios
//!
//! Produces [`DataBundle`]s with the same layout as recorded data: a true
//! trajectory flown with piecewise-constant turn rate, observed through a
//! position sensor with Gaussian noise. Every realization shares the
//! trajectory and draws its own measurement noise from a seed derived from
//! the base seed, so runs are reproducible and realizations independent.

use alloc::vec::Vec;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::bundle::{DataBundle, InitialStateMoments, Realization};
use crate::models::{constant_turn_matrix, STATE_DIM, TURN_RATE_INDEX};
use crate::types::spaces::StateVector;
use crate::{ImmError, Result};

/// The true turn rate switches to `turn_rate` at `start_step` and holds until
/// the next segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnSegment {
    pub start_step: usize,
    pub turn_rate: f64,
}

/// Description of a synthetic scenario and of the filter tuning stored with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub steps: usize,
    pub realizations: usize,
    /// Sampling interval (seconds)
    pub dt: f64,
    /// True state at step 0, `[x, vx, y, vy, omega]`
    pub initial_state: [f64; STATE_DIM],
    /// Turn-rate schedule, sorted by `start_step`
    pub segments: Vec<TurnSegment>,
    /// Standard deviation of the position measurement noise on each axis
    pub measurement_noise_std: f64,
    /// Acceleration variance given to both filter modes
    pub process_noise_variance: f64,
    /// Turn-rate process variance given to the CT mode
    pub turn_rate_variance: f64,
    /// Probability of staying in the current mode between steps
    pub mode_stay_probability: f64,
    /// Filter prior
    pub prior: InitialStateMoments,
    pub seed: u64,
}

impl ScenarioConfig {
    /// Straight flight at constant velocity.
    pub fn straight_line(steps: usize, realizations: usize, seed: u64) -> Self {
        Self {
            steps,
            realizations,
            dt: 1.0,
            initial_state: [0.0, 10.0, 0.0, 5.0, 0.0],
            segments: Vec::new(),
            measurement_noise_std: 1.0,
            process_noise_variance: 0.01,
            turn_rate_variance: 1e-4,
            mode_stay_probability: 0.95,
            prior: InitialStateMoments {
                position_mean: [0.0, 0.0],
                velocity_mean: [0.0, 0.0],
                turn_rate_mean: 0.0,
                position_variance: 100.0,
                velocity_variance: 100.0,
                turn_rate_variance: 0.01,
            },
            seed,
        }
    }

    /// Straight leg, coordinated turn, straight leg, each about a third of
    /// the run.
    pub fn maneuvering(steps: usize, realizations: usize, seed: u64) -> Self {
        Self {
            initial_state: [0.0, 15.0, 0.0, 0.0, 0.0],
            segments: alloc::vec![
                TurnSegment {
                    start_step: steps / 3,
                    turn_rate: 0.08,
                },
                TurnSegment {
                    start_step: 2 * steps / 3,
                    turn_rate: 0.0,
                },
            ],
            ..Self::straight_line(steps, realizations, seed)
        }
    }

    pub fn with_measurement_noise_std(mut self, std: f64) -> Self {
        self.measurement_noise_std = std;
        self
    }

    /// True turn rate in effect at step `k`.
    pub fn turn_rate_at(&self, k: usize) -> f64 {
        self.segments
            .iter()
            .take_while(|segment| segment.start_step <= k)
            .last()
            .map_or(self.initial_state[TURN_RATE_INDEX], |segment| segment.turn_rate)
    }

    fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(ImmError::InvalidParameter {
                name: "steps",
                reason: "must be positive",
            });
        }
        if self.realizations == 0 {
            return Err(ImmError::InvalidParameter {
                name: "realizations",
                reason: "must be positive",
            });
        }
        if !(self.dt > 0.0) {
            return Err(ImmError::InvalidParameter {
                name: "dt",
                reason: "sampling interval must be positive",
            });
        }
        if !(self.measurement_noise_std > 0.0) {
            return Err(ImmError::InvalidParameter {
                name: "measurement_noise_std",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Propagates the true state through the turn-rate schedule.
pub fn true_trajectory(config: &ScenarioConfig) -> Vec<[f64; STATE_DIM]> {
    let mut truth = Vec::with_capacity(config.steps);
    let mut state = config.initial_state;
    state[TURN_RATE_INDEX] = config.turn_rate_at(0);

    for k in 0..config.steps {
        truth.push(state);
        let omega = config.turn_rate_at(k + 1);
        let f = constant_turn_matrix(state[TURN_RATE_INDEX], config.dt);
        state = f.apply_state(&StateVector::from_array(state)).to_array();
        state[TURN_RATE_INDEX] = omega;
    }

    truth
}

/// Seed of realization `index`.
#[inline]
pub fn realization_seed(base: u64, index: usize) -> u64 {
    base.wrapping_add(index as u64)
}

/// Generates a bundle for the scenario.
pub fn generate_bundle(config: &ScenarioConfig) -> Result<DataBundle> {
    config.validate()?;

    let truth = true_trajectory(config);
    let noise = Normal::new(0.0, config.measurement_noise_std).map_err(|_| {
        ImmError::InvalidParameter {
            name: "measurement_noise_std",
            reason: "must be finite",
        }
    })?;

    let realizations = (0..config.realizations)
        .map(|r| {
            let mut rng = StdRng::seed_from_u64(realization_seed(config.seed, r));
            let measurements = truth
                .iter()
                .map(|state| {
                    [
                        state[0] + noise.sample(&mut rng),
                        state[2] + noise.sample(&mut rng),
                    ]
                })
                .collect();
            Realization {
                truth: truth.clone(),
                measurements,
            }
        })
        .collect();

    let q = config.process_noise_variance;
    let r = config.measurement_noise_std * config.measurement_noise_std;
    let stay = config.mode_stay_probability;

    let bundle = DataBundle {
        sampling_interval: config.dt,
        process_noise: [[q, 0.0], [0.0, q]],
        cv_process_noise: None,
        ct_process_noise: None,
        measurement_noise: [[r, 0.0], [0.0, r]],
        turn_rate_variance: config.turn_rate_variance,
        mode_transition: [[stay, 1.0 - stay], [1.0 - stay, stay]],
        initial_mode_probabilities: None,
        likelihood_floor: None,
        initial_state: config.prior.clone(),
        realizations,
    };
    bundle.validate()?;

    log::debug!(
        "generated {} realizations x {} steps (seed {})",
        config.realizations,
        config.steps,
        config.seed
    );

    Ok(bundle)
}
