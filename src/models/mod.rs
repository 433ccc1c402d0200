//! Motion and sensor models
//!
//! This module defines the traits that describe target dynamics and sensor
//! characteristics, plus the CV/CT model pair used by the IMM bank.

mod observation;
mod transition;

pub use observation::*;
pub use transition::*;
