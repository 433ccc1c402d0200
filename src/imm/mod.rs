//! Interacting Multiple Model estimator
//!
//! A bank of two filters (constant velocity, constant turn) whose estimates
//! are mixed every step according to a Markov mode-switching chain.
//!
//! # Reference
//!
//! Blom, H. A. P., & Bar-Shalom, Y. (1988). "The Interacting Multiple Model
//! Algorithm for Systems with Markovian Switching Coefficients." IEEE
//! Transactions on Automatic Control, 33(8), 780-783.

pub mod combine;
pub mod estimator;
pub mod mixing;
pub mod params;
pub mod probability;

pub use estimator::{CtFilter, CvFilter, ImmEstimator, ImmStepOutput, ModeFilterState};
pub use params::{ImmParameters, InitialStatePrior, ModeTransitionMatrix, NUM_MODES};
pub use probability::ModeLikelihood;
