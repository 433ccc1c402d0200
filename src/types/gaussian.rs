//! Gaussian densities of innovations
//!
//! The likelihood evaluator of the IMM scores each model's innovation against
//! a zero-mean Gaussian with the model's innovation covariance.

use nalgebra::{RealField, SMatrix};

use super::spaces::Innovation;

/// Smallest likelihood the mode probability update will ever see.
pub const DEFAULT_LIKELIHOOD_FLOOR: f64 = 1e-300;

/// Computes the Gaussian density of an innovation.
///
/// p(y) = (2*pi)^(-M/2) |S|^(-1/2) exp(-0.5 * y^T * S^{-1} * y)
///
/// Uses a Cholesky factorization of S for both the determinant and the
/// Mahalanobis term. Returns `None` if S is not positive definite.
pub fn innovation_density<T: RealField + Copy, const M: usize>(
    innovation: &Innovation<T, M>,
    innovation_cov: &SMatrix<T, M, M>,
) -> Option<T> {
    let chol = nalgebra::Cholesky::new(*innovation_cov)?;
    let l = chol.l();

    let mut det_l = T::one();
    for i in 0..M {
        det_l = det_l * l[(i, i)];
    }
    if det_l <= T::zero() {
        return None;
    }

    // ||L^{-1} y||^2 = y^T S^{-1} y
    let whitened = l.solve_lower_triangular(innovation.as_svector())?;
    let mahal_sq = whitened.norm_squared();

    let half: T = nalgebra::convert(0.5);
    let dim: T = nalgebra::convert(M as f64);
    let norm = (T::two_pi()).powf(dim * half) * det_l;

    Some((-half * mahal_sq).exp() / norm)
}

/// Likelihood of an innovation, clamped from below at `floor`.
///
/// A density that cannot be evaluated (S not positive definite) counts as
/// zero and is therefore clamped as well. The second element reports whether
/// the floor was applied.
pub fn floored_likelihood<T: RealField + Copy, const M: usize>(
    innovation: &Innovation<T, M>,
    innovation_cov: &SMatrix<T, M, M>,
    floor: T,
) -> (T, bool) {
    match innovation_density(innovation, innovation_cov) {
        Some(density) if density >= floor => (density, false),
        _ => (floor, true),
    }
}
