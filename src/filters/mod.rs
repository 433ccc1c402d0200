//! Single-model filters of the IMM bank
//!
//! - [`kalman::KalmanFilter`]: linear Kalman filter (constant-velocity mode)
//! - [`ekf::ExtendedKalmanFilter`]: Extended Kalman Filter (constant-turn mode)
//!
//! Both expose a `cycle` that returns a [`kalman::FilterCycle`] with the
//! prediction, innovation statistics and update of one time step.

pub mod ekf;
pub mod kalman;
