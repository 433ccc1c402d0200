//! Input data bundle
//!
//! A bundle holds the fixed run parameters plus, per Monte-Carlo realization,
//! the ground-truth state sequence and the noisy position measurements. It is
//! exchanged as JSON:
//!
//! ```json
//! {
//!   "sampling_interval": 1.0,
//!   "process_noise": [[0.1, 0.0], [0.0, 0.1]],
//!   "measurement_noise": [[1.0, 0.0], [0.0, 1.0]],
//!   "turn_rate_variance": 0.0001,
//!   "mode_transition": [[0.95, 0.05], [0.05, 0.95]],
//!   "initial_state": {
//!     "position_mean": [0.0, 0.0], "velocity_mean": [0.0, 0.0], "turn_rate_mean": 0.0,
//!     "position_variance": 100.0, "velocity_variance": 10.0, "turn_rate_variance": 0.01
//!   },
//!   "realizations": [{ "truth": [[0, 1, 0, 0, 0]], "measurements": [[0.1, -0.2]] }]
//! }
//! ```

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::imm::{ImmParameters, InitialStatePrior, ModeTransitionMatrix};
use crate::models::{MEAS_DIM, STATE_DIM};
use crate::types::spaces::Measurement;
use crate::{ImmError, Result};

type Matrix2 = [[f64; 2]; 2];

fn to_matrix(rows: &Matrix2) -> nalgebra::Matrix2<f64> {
    nalgebra::matrix![
        rows[0][0], rows[0][1];
        rows[1][0], rows[1][1]
    ]
}

/// Means and variances of the initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialStateMoments {
    pub position_mean: [f64; 2],
    pub velocity_mean: [f64; 2],
    pub turn_rate_mean: f64,
    pub position_variance: f64,
    pub velocity_variance: f64,
    pub turn_rate_variance: f64,
}

impl InitialStateMoments {
    pub fn to_prior(&self) -> InitialStatePrior<f64> {
        InitialStatePrior::from_moments(
            self.position_mean,
            self.velocity_mean,
            self.turn_rate_mean,
            self.position_variance,
            self.velocity_variance,
            self.turn_rate_variance,
        )
    }
}

/// One simulated target: true states and the measurements taken of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realization {
    /// True `[x, vx, y, vy, omega]` per step
    pub truth: Vec<[f64; STATE_DIM]>,
    /// Measured `[x, y]` per step
    pub measurements: Vec<[f64; MEAS_DIM]>,
}

impl Realization {
    /// Number of time steps.
    #[inline]
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Measurements as typed vectors.
    pub fn measurement_vectors(&self) -> Vec<Measurement<f64, MEAS_DIM>> {
        self.measurements
            .iter()
            .map(|&z| Measurement::from_array(z))
            .collect()
    }

    /// True position `[x, y]` at step `k`.
    ///
    /// # Panics
    /// Panics if `k` is out of range.
    #[inline]
    pub fn true_position(&self, k: usize) -> [f64; 2] {
        [self.truth[k][0], self.truth[k][2]]
    }
}

/// Fixed parameters plus the Monte-Carlo realizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBundle {
    /// Sampling interval T (seconds)
    pub sampling_interval: f64,
    /// Acceleration covariance shared by both modes
    pub process_noise: Matrix2,
    /// CV override of `process_noise`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_process_noise: Option<Matrix2>,
    /// CT override of `process_noise`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct_process_noise: Option<Matrix2>,
    /// Position measurement noise R
    pub measurement_noise: Matrix2,
    /// Turn-rate process variance of the CT mode
    pub turn_rate_variance: f64,
    /// Markov mode transition matrix (row i: from mode i)
    pub mode_transition: Matrix2,
    /// Mode probabilities at k = 0; uniform when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_mode_probabilities: Option<[f64; 2]>,
    /// Likelihood floor; the library default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood_floor: Option<f64>,
    pub initial_state: InitialStateMoments,
    pub realizations: Vec<Realization>,
}

impl DataBundle {
    /// Number of time steps shared by every realization (0 if there are none).
    pub fn steps(&self) -> usize {
        self.realizations.first().map_or(0, Realization::len)
    }

    /// Checks that the realizations form a rectangular data set.
    ///
    /// There must be at least one realization, every realization must have
    /// the same non-zero number of steps, and truth and measurements must
    /// have equal lengths.
    pub fn validate(&self) -> Result<()> {
        let first = self.realizations.first().ok_or(ImmError::ShapeMismatch {
            field: "realizations",
            expected: 1,
            actual: 0,
        })?;

        let steps = first.len();
        if steps == 0 {
            return Err(ImmError::ShapeMismatch {
                field: "measurements",
                expected: 1,
                actual: 0,
            });
        }

        for realization in &self.realizations {
            if realization.measurements.len() != steps {
                return Err(ImmError::ShapeMismatch {
                    field: "measurements",
                    expected: steps,
                    actual: realization.measurements.len(),
                });
            }
            if realization.truth.len() != steps {
                return Err(ImmError::ShapeMismatch {
                    field: "truth",
                    expected: steps,
                    actual: realization.truth.len(),
                });
            }
        }

        Ok(())
    }

    /// Builds validated estimator parameters from the bundle's scalars.
    pub fn parameters(&self) -> Result<ImmParameters<f64>> {
        let transition = ModeTransitionMatrix::new(to_matrix(&self.mode_transition))?;

        let mut params = ImmParameters::new(
            self.sampling_interval,
            transition,
            to_matrix(&self.process_noise),
            to_matrix(&self.measurement_noise),
            self.initial_state.to_prior(),
        )
        .with_turn_rate_variance(self.turn_rate_variance);

        if let Some(q) = &self.cv_process_noise {
            params = params.with_cv_process_noise(to_matrix(q));
        }
        if let Some(q) = &self.ct_process_noise {
            params = params.with_ct_process_noise(to_matrix(q));
        }
        if let Some(mu) = self.initial_mode_probabilities {
            params = params.with_initial_mode_probabilities(mu);
        }
        if let Some(floor) = self.likelihood_floor {
            params = params.with_likelihood_floor(floor);
        }

        params.validate()?;
        Ok(params)
    }

    /// Parses and validates a JSON bundle.
    #[cfg(feature = "std")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let bundle: DataBundle = serde_json::from_str(json)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Reads, parses and validates a JSON bundle file.
    #[cfg(feature = "std")]
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Serializes the bundle to pretty-printed JSON.
    #[cfg(feature = "std")]
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "sampling_interval": 1.0,
        "process_noise": [[0.1, 0.0], [0.0, 0.1]],
        "ct_process_noise": [[0.5, 0.0], [0.0, 0.5]],
        "measurement_noise": [[1.0, 0.0], [0.0, 1.0]],
        "turn_rate_variance": 0.0001,
        "mode_transition": [[0.95, 0.05], [0.05, 0.95]],
        "initial_state": {
            "position_mean": [0.0, 0.0],
            "velocity_mean": [1.0, 0.0],
            "turn_rate_mean": 0.0,
            "position_variance": 100.0,
            "velocity_variance": 10.0,
            "turn_rate_variance": 0.01
        },
        "realizations": [
            {
                "truth": [[0.0, 1.0, 0.0, 0.0, 0.0], [1.0, 1.0, 0.0, 0.0, 0.0]],
                "measurements": [[0.1, -0.1], [0.9, 0.2]]
            },
            {
                "truth": [[0.0, 1.0, 0.0, 0.0, 0.0], [1.0, 1.0, 0.0, 0.0, 0.0]],
                "measurements": [[-0.3, 0.0], [1.2, 0.1]]
            }
        ]
    }"#;

    #[test]
    fn test_parse_bundle() {
        let bundle = DataBundle::from_json_str(BUNDLE).unwrap();

        assert_eq!(bundle.realizations.len(), 2);
        assert_eq!(bundle.steps(), 2);
        assert!(bundle.cv_process_noise.is_none());
        assert_eq!(bundle.realizations[1].true_position(1), [1.0, 0.0]);
        assert!((bundle.realizations[0].measurement_vectors()[1].index(0) - 0.9).abs() < 1e-15);
    }

    #[test]
    fn test_parameters_apply_overrides() {
        let params = DataBundle::from_json_str(BUNDLE).unwrap().parameters().unwrap();

        assert!((params.cv_process_noise[(0, 0)] - 0.1).abs() < 1e-15);
        assert!((params.ct_process_noise[(0, 0)] - 0.5).abs() < 1e-15);
        assert!((params.turn_rate_variance - 1e-4).abs() < 1e-15);
        assert!((params.prior.mean.index(1) - 1.0).abs() < 1e-15);
        assert!((params.initial_mode_probabilities[1] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_ragged_realizations_are_rejected() {
        let mut bundle = DataBundle::from_json_str(BUNDLE).unwrap();
        bundle.realizations[1].measurements.pop();

        assert_eq!(
            bundle.validate(),
            Err(ImmError::ShapeMismatch {
                field: "measurements",
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_truth_length_must_match() {
        let mut bundle = DataBundle::from_json_str(BUNDLE).unwrap();
        bundle.realizations[0].truth.push([2.0, 1.0, 0.0, 0.0, 0.0]);

        assert!(matches!(
            bundle.validate(),
            Err(ImmError::ShapeMismatch { field: "truth", .. })
        ));
    }

    #[test]
    fn test_empty_bundle_is_rejected() {
        let mut bundle = DataBundle::from_json_str(BUNDLE).unwrap();
        bundle.realizations.clear();
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn test_non_stochastic_transition_is_rejected() {
        let mut bundle = DataBundle::from_json_str(BUNDLE).unwrap();
        bundle.mode_transition = [[0.9, 0.2], [0.05, 0.95]];

        assert!(matches!(
            bundle.parameters(),
            Err(ImmError::InvalidParameter { name: "mode_transition", .. })
        ));
    }

    #[test]
    fn test_indefinite_noise_is_rejected_at_load() {
        let json = BUNDLE.replace(
            r#""measurement_noise": [[1.0, 0.0], [0.0, 1.0]]"#,
            r#""measurement_noise": [[1.0, 2.0], [2.0, 1.0]]"#,
        );
        let bundle = DataBundle::from_json_str(&json).unwrap();
        assert!(matches!(
            bundle.parameters(),
            Err(ImmError::InvalidParameter { name: "measurement_noise", .. })
        ));

        let mut bundle = DataBundle::from_json_str(BUNDLE).unwrap();
        bundle.ct_process_noise = Some([[0.1, 0.3], [0.3, 0.1]]);
        assert!(matches!(
            bundle.parameters(),
            Err(ImmError::InvalidParameter { name: "process_noise", .. })
        ));

        bundle.ct_process_noise = Some([[f64::NAN, 0.0], [0.0, 0.1]]);
        assert!(bundle.parameters().is_err());
    }

    #[test]
    fn test_wrong_inner_dimension_is_a_parse_error() {
        let json = BUNDLE.replace("[0.1, -0.1]", "[0.1, -0.1, 7.0]");
        assert!(matches!(DataBundle::from_json_str(&json), Err(ImmError::Parse(_))));
    }
}
