//! immtrack: Interacting Multiple Model tracking for maneuvering targets
//!
//! A type-safe two-mode IMM estimator (constant velocity + constant turn)
//! with a Monte-Carlo evaluation driver.
//!
//! # Features
//!
//! - **Type Safety**: vector spaces encoded in the type system, dimensions
//!   checked at compile time
//! - **Two-mode bank**: linear Kalman filter (CV) and extended Kalman filter (CT)
//! - **Monte-Carlo evaluation**: realization-averaged MSE, in parallel with
//!   the `rayon` feature

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bundle;
pub mod filters;
pub mod imm;
pub mod models;
pub mod montecarlo;
pub mod scenario;
pub mod types;

pub mod prelude {
    pub use crate::bundle::*;
    pub use crate::filters::ekf::*;
    pub use crate::filters::kalman::*;
    pub use crate::imm::*;
    pub use crate::models::*;
    pub use crate::montecarlo::*;
    pub use crate::types::spaces::*;
    pub use crate::types::transforms::*;
    pub use crate::{ImmError, Result};
}

use alloc::string::String;

/// Error types for the library
#[derive(Debug, Clone, PartialEq)]
pub enum ImmError {
    /// Mode index other than 0 (CV) or 1 (CT)
    UnknownMode { index: usize },
    /// Matrix is singular and cannot be inverted
    SingularMatrix { context: &'static str },
    /// Configuration value out of range
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
    /// Input arrays with inconsistent lengths
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Reading an input file failed
    Io(String),
    /// An input file could not be parsed
    Parse(String),
}

#[cfg(feature = "std")]
impl std::error::Error for ImmError {}

impl ::core::fmt::Display for ImmError {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            ImmError::UnknownMode { index } => {
                write!(f, "Unknown motion mode index {} (expected 0 = CV or 1 = CT)", index)
            }
            ImmError::SingularMatrix { context } => write!(f, "Matrix is singular: {}", context),
            ImmError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter `{}`: {}", name, reason)
            }
            ImmError::ShapeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "Shape mismatch in `{}`: expected {}, got {}",
                field, expected, actual
            ),
            ImmError::Io(msg) => write!(f, "I/O error: {}", msg),
            ImmError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for ImmError {
    fn from(err: std::io::Error) -> Self {
        ImmError::Io(err.to_string())
    }
}

#[cfg(feature = "std")]
impl From<serde_json::Error> for ImmError {
    fn from(err: serde_json::Error) -> Self {
        ImmError::Parse(err.to_string())
    }
}

pub type Result<T> = ::core::result::Result<T, ImmError>;
