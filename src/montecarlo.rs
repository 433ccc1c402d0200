//! Monte-Carlo evaluation of the IMM estimator
//!
//! Every realization of a [`DataBundle`] is filtered by its own estimator,
//! starting from the same prior. Squared position errors of the combined
//! prediction and estimate, already divided by the number of realizations,
//! are returned per realization as an [`MseAccumulator`] and summed in an
//! explicit reduction. With the `rayon` feature the realizations run on the
//! rayon thread pool.

use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::bundle::{DataBundle, Realization};
use crate::imm::{ImmEstimator, ImmParameters, NUM_MODES};
use crate::models::STATE_DIM;
use crate::{ImmError, Result};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

// ============================================================================
// Analysis window
// ============================================================================

/// Half-open range `[start, end)` of time steps over which MSE is averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: usize,
    pub end: usize,
}

impl AnalysisWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Skips the first 10% of the sequence as warm-up.
    pub fn trailing(len: usize) -> Self {
        Self {
            start: len / 10,
            end: len,
        }
    }

    /// Checks that the window is non-empty and inside a sequence of `len` steps.
    pub fn validate(&self, len: usize) -> Result<()> {
        if self.start >= self.end {
            return Err(ImmError::InvalidParameter {
                name: "window",
                reason: "start must be before end",
            });
        }
        if self.end > len {
            return Err(ImmError::ShapeMismatch {
                field: "window",
                expected: len,
                actual: self.end,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean of `series` over the window.
    ///
    /// # Panics
    /// Panics if the window extends past the end of `series`.
    pub fn average(&self, series: &[f64]) -> f64 {
        let window = &series[self.start..self.end];
        window.iter().sum::<f64>() / window.len() as f64
    }
}

// ============================================================================
// MSE accumulator
// ============================================================================

/// Realization-averaged squared position errors, per time step and axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MseAccumulator {
    /// Combined prediction error, `[x, y]` per step
    pub prediction: Vec<[f64; 2]>,
    /// Combined estimate error, `[x, y]` per step
    pub estimate: Vec<[f64; 2]>,
}

impl MseAccumulator {
    pub fn zeros(steps: usize) -> Self {
        Self {
            prediction: alloc::vec![[0.0; 2]; steps],
            estimate: alloc::vec![[0.0; 2]; steps],
        }
    }

    #[inline]
    pub fn steps(&self) -> usize {
        self.prediction.len()
    }

    /// Adds `weight` times the squared prediction and estimate errors at step `k`.
    pub fn accumulate(
        &mut self,
        k: usize,
        truth: [f64; 2],
        predicted: [f64; 2],
        estimated: [f64; 2],
        weight: f64,
    ) {
        for axis in 0..2 {
            let dp = predicted[axis] - truth[axis];
            let de = estimated[axis] - truth[axis];
            self.prediction[k][axis] += weight * dp * dp;
            self.estimate[k][axis] += weight * de * de;
        }
    }

    /// Sums two partial accumulators.
    pub fn merge(mut self, other: &MseAccumulator) -> Result<Self> {
        if other.steps() != self.steps() {
            return Err(ImmError::ShapeMismatch {
                field: "mse",
                expected: self.steps(),
                actual: other.steps(),
            });
        }
        for (acc, add) in self.prediction.iter_mut().zip(&other.prediction) {
            acc[0] += add[0];
            acc[1] += add[1];
        }
        for (acc, add) in self.estimate.iter_mut().zip(&other.estimate) {
            acc[0] += add[0];
            acc[1] += add[1];
        }
        Ok(self)
    }

    /// Prediction MSE per step, summed over both position axes.
    pub fn prediction_mse(&self) -> Vec<f64> {
        self.prediction.iter().map(|e| e[0] + e[1]).collect()
    }

    /// Estimate MSE per step, summed over both position axes.
    pub fn estimate_mse(&self) -> Vec<f64> {
        self.estimate.iter().map(|e| e[0] + e[1]).collect()
    }
}

// ============================================================================
// Per-realization trajectories
// ============================================================================

/// Filter outputs of one realization, step by step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealizationTrace {
    /// Combined estimate `[x, vx, y, vy, omega]`
    pub estimates: Vec<[f64; STATE_DIM]>,
    /// Mode probabilities `[CV, CT]`
    pub mode_probabilities: Vec<[f64; NUM_MODES]>,
    /// Combined (IMM) turn-rate estimate
    pub imm_turn_rate: Vec<f64>,
    /// Turn-rate estimate of the CT filter in the bank
    pub ct_turn_rate: Vec<f64>,
}

impl RealizationTrace {
    fn with_capacity(steps: usize) -> Self {
        Self {
            estimates: Vec::with_capacity(steps),
            mode_probabilities: Vec::with_capacity(steps),
            imm_turn_rate: Vec::with_capacity(steps),
            ct_turn_rate: Vec::with_capacity(steps),
        }
    }
}

/// Runs one realization through a fresh copy of `estimator`.
///
/// Returns its MSE contribution scaled by `weight` and, if `record` is set,
/// its trajectories.
pub fn run_realization(
    estimator: &ImmEstimator<f64>,
    realization: &Realization,
    weight: f64,
    record: bool,
) -> Result<(MseAccumulator, Option<RealizationTrace>)> {
    let steps = realization.len();
    if realization.truth.len() != steps {
        return Err(ImmError::ShapeMismatch {
            field: "truth",
            expected: steps,
            actual: realization.truth.len(),
        });
    }

    let mut imm = estimator.clone();
    imm.reset();

    let mut mse = MseAccumulator::zeros(steps);
    let mut trace = record.then(|| RealizationTrace::with_capacity(steps));

    for (k, z) in realization.measurement_vectors().iter().enumerate() {
        let out = imm.step(z)?;

        mse.accumulate(
            k,
            realization.true_position(k),
            out.predicted_position(),
            out.estimated_position(),
            weight,
        );

        if let Some(trace) = trace.as_mut() {
            trace.estimates.push(out.estimate.mean.to_array());
            trace.mode_probabilities.push(out.mode_probabilities);
            trace.imm_turn_rate.push(out.turn_rate());
            trace.ct_turn_rate.push(out.ct_turn_rate());
        }
    }

    Ok((mse, trace))
}

// ============================================================================
// Reduction
// ============================================================================

/// Partial result of the reduction over realizations.
#[derive(Debug, Clone)]
struct Partial {
    mse: MseAccumulator,
    trace: Option<RealizationTrace>,
}

impl Partial {
    fn empty(steps: usize) -> Self {
        Self {
            mse: MseAccumulator::zeros(steps),
            trace: None,
        }
    }

    fn merge(self, other: Partial) -> Result<Self> {
        Ok(Self {
            mse: self.mse.merge(&other.mse)?,
            trace: self.trace.or(other.trace),
        })
    }
}

fn run_one(
    estimator: &ImmEstimator<f64>,
    bundle: &DataBundle,
    index: usize,
    weight: f64,
) -> Result<Partial> {
    let (mse, trace) = run_realization(estimator, &bundle.realizations[index], weight, index == 0)?;
    log::debug!("realization {} done", index);
    Ok(Partial { mse, trace })
}

fn reduce_sequential(estimator: &ImmEstimator<f64>, bundle: &DataBundle, weight: f64) -> Result<Partial> {
    (0..bundle.realizations.len()).try_fold(Partial::empty(bundle.steps()), |acc, r| {
        acc.merge(run_one(estimator, bundle, r, weight)?)
    })
}

#[cfg(feature = "rayon")]
fn reduce_parallel(estimator: &ImmEstimator<f64>, bundle: &DataBundle, weight: f64) -> Result<Partial> {
    let steps = bundle.steps();
    (0..bundle.realizations.len())
        .into_par_iter()
        .map(|r| run_one(estimator, bundle, r, weight))
        .try_reduce(|| Partial::empty(steps), Partial::merge)
}

#[cfg(not(feature = "rayon"))]
fn reduce_parallel(estimator: &ImmEstimator<f64>, bundle: &DataBundle, weight: f64) -> Result<Partial> {
    log::debug!("built without rayon, running realizations sequentially");
    reduce_sequential(estimator, bundle, weight)
}

// ============================================================================
// Driver
// ============================================================================

/// How to run the Monte-Carlo evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonteCarloOptions {
    /// Averaging window; the trailing 90% of the run when `None`
    pub window: Option<AnalysisWindow>,
    /// Run realizations in parallel (needs the `rayon` feature)
    pub parallel: bool,
}

impl Default for MonteCarloOptions {
    fn default() -> Self {
        Self {
            window: None,
            parallel: true,
        }
    }
}

impl MonteCarloOptions {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_window(mut self, window: AnalysisWindow) -> Self {
        self.window = Some(window);
        self
    }
}

/// Outcome of a Monte-Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub realizations: usize,
    pub steps: usize,
    pub window: AnalysisWindow,
    /// Realization-averaged squared errors per step and axis
    pub mse: MseAccumulator,
    /// Combined prediction MSE per step, summed over axes
    pub prediction_mse: Vec<f64>,
    /// Combined estimate MSE per step, summed over axes
    pub estimate_mse: Vec<f64>,
    /// Prediction MSE averaged over the window
    pub window_prediction_mse: f64,
    /// Estimate MSE averaged over the window
    pub window_estimate_mse: f64,
    /// Trajectories of realization 0
    pub trace: RealizationTrace,
}

impl fmt::Display for MonteCarloReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "IMM (CV/CT) Monte-Carlo: {} realizations x {} steps",
            self.realizations, self.steps
        )?;
        writeln!(f, "analysis window: steps [{}, {})", self.window.start, self.window.end)?;
        writeln!(f, "average prediction MSE: {:.6}", self.window_prediction_mse)?;
        writeln!(f, "average estimate MSE:   {:.6}", self.window_estimate_mse)?;
        if let Some(mu) = self.trace.mode_probabilities.last() {
            write!(f, "final mode probabilities (realization 0): CV {:.4}, CT {:.4}", mu[0], mu[1])?;
        }
        Ok(())
    }
}

/// Filters every realization of `bundle` and reports the averaged MSE.
pub fn run_monte_carlo(bundle: &DataBundle, options: &MonteCarloOptions) -> Result<MonteCarloReport> {
    bundle.validate()?;
    let params = bundle.parameters()?;
    run_with_parameters(params, bundle, options)
}

/// Same as [`run_monte_carlo`] with explicitly supplied parameters.
pub fn run_with_parameters(
    params: ImmParameters<f64>,
    bundle: &DataBundle,
    options: &MonteCarloOptions,
) -> Result<MonteCarloReport> {
    bundle.validate()?;
    let steps = bundle.steps();
    let realizations = bundle.realizations.len();
    let window = options.window.unwrap_or_else(|| AnalysisWindow::trailing(steps));
    window.validate(steps)?;

    let estimator = ImmEstimator::new(params)?;
    let weight = 1.0 / realizations as f64;

    log::info!(
        "running {} realizations x {} steps ({})",
        realizations,
        steps,
        if options.parallel { "parallel" } else { "sequential" }
    );

    let partial = if options.parallel {
        reduce_parallel(&estimator, bundle, weight)?
    } else {
        reduce_sequential(&estimator, bundle, weight)?
    };

    let trace = partial.trace.ok_or(ImmError::ShapeMismatch {
        field: "realizations",
        expected: 1,
        actual: 0,
    })?;

    let prediction_mse = partial.mse.prediction_mse();
    let estimate_mse = partial.mse.estimate_mse();
    let window_prediction_mse = window.average(&prediction_mse);
    let window_estimate_mse = window.average(&estimate_mse);

    log::info!(
        "average prediction MSE over steps [{}, {}): {:.6}",
        window.start,
        window.end,
        window_prediction_mse
    );

    Ok(MonteCarloReport {
        realizations,
        steps,
        window,
        mse: partial.mse,
        prediction_mse,
        estimate_mse,
        window_prediction_mse,
        window_estimate_mse,
        trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{generate_bundle, ScenarioConfig};

    #[test]
    fn test_default_window_skips_warm_up() {
        let window = AnalysisWindow::trailing(25);
        assert_eq!(window, AnalysisWindow::new(2, 25));
        assert!(window.validate(25).is_ok());
    }

    #[test]
    fn test_window_validation() {
        assert!(AnalysisWindow::new(5, 5).validate(10).is_err());
        assert!(AnalysisWindow::new(6, 3).validate(10).is_err());
        assert!(matches!(
            AnalysisWindow::new(0, 11).validate(10),
            Err(ImmError::ShapeMismatch { field: "window", .. })
        ));
    }

    #[test]
    fn test_window_average() {
        let window = AnalysisWindow::new(1, 3);
        assert!((window.average(&[100.0, 2.0, 4.0, 100.0]) - 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_accumulator_weighting_and_merge() {
        let mut a = MseAccumulator::zeros(2);
        a.accumulate(0, [0.0, 0.0], [1.0, 2.0], [0.5, 0.0], 0.5);
        let mut b = MseAccumulator::zeros(2);
        b.accumulate(0, [0.0, 0.0], [3.0, 0.0], [0.0, 1.0], 0.5);

        let merged = a.merge(&b).unwrap();
        // (1 + 4)/2 + 9/2
        assert!((merged.prediction_mse()[0] - 7.0).abs() < 1e-12);
        // 0.25/2 + 1/2
        assert!((merged.estimate_mse()[0] - 0.625).abs() < 1e-12);
        assert!(merged.prediction_mse()[1].abs() < 1e-15);

        assert!(MseAccumulator::zeros(2).merge(&MseAccumulator::zeros(3)).is_err());
    }

    #[test]
    fn test_report_carries_first_realization_trace() {
        let bundle = generate_bundle(&ScenarioConfig::straight_line(15, 3, 11)).unwrap();
        let report = run_monte_carlo(&bundle, &MonteCarloOptions::sequential()).unwrap();

        assert_eq!(report.realizations, 3);
        assert_eq!(report.trace.estimates.len(), 15);
        assert_eq!(report.trace.ct_turn_rate.len(), 15);
        assert_eq!(report.prediction_mse.len(), 15);

        let params = bundle.parameters().unwrap();
        let estimator = ImmEstimator::new(params).unwrap();
        let (_, trace) = run_realization(&estimator, &bundle.realizations[0], 1.0, true).unwrap();
        assert_eq!(trace.unwrap(), report.trace);
    }

    #[test]
    fn test_single_realization_mse_is_squared_error() {
        let bundle = generate_bundle(&ScenarioConfig::straight_line(10, 1, 3)).unwrap();
        let report = run_monte_carlo(&bundle, &MonteCarloOptions::sequential()).unwrap();

        let truth = bundle.realizations[0].true_position(9);
        let est = report.trace.estimates[9];
        let expected = (est[0] - truth[0]).powi(2) + (est[2] - truth[1]).powi(2);
        assert!((report.estimate_mse[9] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_window_is_rejected() {
        let bundle = generate_bundle(&ScenarioConfig::straight_line(10, 1, 3)).unwrap();
        let options = MonteCarloOptions::sequential().with_window(AnalysisWindow::new(2, 20));
        assert!(run_monte_carlo(&bundle, &options).is_err());
    }
}
