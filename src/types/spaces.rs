//! Vector space markers and typed vectors
//!
//! Vectors and covariances carry a marker for the space they live in
//! (state, measurement, innovation) so a measurement cannot be added to a
//! state estimate by accident.

use ::core::marker::PhantomData;
use ::core::ops::{Add, Mul, Neg, Sub};
use nalgebra::{RealField, SMatrix, SVector, Scalar};

// ============================================================================
// Vector Space Markers
// ============================================================================

/// Marker type for state space vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSpace;

/// Marker type for measurement space vectors (position observations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSpace;

/// Marker type for innovation vectors (measurement - predicted measurement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnovationSpace;

/// Marker type for the random acceleration input driving the motion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisturbanceSpace;

// ============================================================================
// Typed Vector
// ============================================================================

/// A vector parameterized by scalar type, dimension, and space marker.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T: Scalar, const N: usize, Space> {
    inner: SVector<T, N>,
    _marker: PhantomData<Space>,
}

impl<T: Scalar, const N: usize, Space> Vector<T, N, Space> {
    /// Creates a new vector from raw components.
    #[inline]
    pub fn from_array(data: [T; N]) -> Self {
        Self {
            inner: SVector::from(data),
            _marker: PhantomData,
        }
    }

    /// Wraps an nalgebra vector.
    #[inline]
    pub fn from_svector(inner: SVector<T, N>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying nalgebra vector.
    #[inline]
    pub fn as_svector(&self) -> &SVector<T, N> {
        &self.inner
    }

    /// Access element at index.
    ///
    /// # Panics
    /// Panics if index is out of bounds.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn index(&self, index: usize) -> &T {
        &self.inner[index]
    }
}

impl<T: Scalar + Copy, const N: usize, Space: Clone> Copy for Vector<T, N, Space> {}

impl<T: RealField + Copy, const N: usize, Space> Vector<T, N, Space> {
    /// Creates a zero vector.
    #[inline]
    pub fn zeros() -> Self {
        Self::from_svector(SVector::zeros())
    }

    /// Copies the components into a plain array.
    #[inline]
    pub fn to_array(&self) -> [T; N] {
        self.inner.into()
    }

    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self::from_svector(self.inner.scale(s))
    }

    /// Outer product `v * v^T`, returned as a covariance in the same space.
    #[inline]
    pub fn outer(&self) -> Covariance<T, N, Space> {
        Covariance::from_matrix(self.inner * self.inner.transpose())
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// A state vector: `[x, vx, y, vy, omega]` for the models in this crate.
pub type StateVector<T, const N: usize> = Vector<T, N, StateSpace>;

/// A position measurement.
pub type Measurement<T, const M: usize> = Vector<T, M, MeasurementSpace>;

/// An innovation (measurement residual).
pub type Innovation<T, const M: usize> = Vector<T, M, InnovationSpace>;

// ============================================================================
// Operations: Same-Space Arithmetic
// ============================================================================

impl<T: RealField + Copy, const N: usize, Space> Add for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::from_svector(self.inner + rhs.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Space> Sub for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::from_svector(self.inner - rhs.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Space> Neg for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self::Output {
        Self::from_svector(-self.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Space> Mul<T> for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: T) -> Self::Output {
        Self::from_svector(self.inner * rhs)
    }
}

// ============================================================================
// Measurement - Measurement = Innovation
// ============================================================================

/// Computes the innovation between an actual and a predicted measurement.
///
/// Kept as a separate trait because the difference of two measurements lives
/// in innovation space, not measurement space.
pub trait ComputeInnovation<T: RealField, const M: usize> {
    fn innovation(self, predicted: Measurement<T, M>) -> Innovation<T, M>;
}

impl<T: RealField + Copy, const M: usize> ComputeInnovation<T, M> for Measurement<T, M> {
    #[inline]
    fn innovation(self, predicted: Measurement<T, M>) -> Innovation<T, M> {
        Innovation::from_svector(self.inner - predicted.inner)
    }
}

// ============================================================================
// Covariance Matrix
// ============================================================================

/// A covariance matrix bound to a specific vector space.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance<T: Scalar, const N: usize, Space> {
    inner: SMatrix<T, N, N>,
    _marker: PhantomData<Space>,
}

impl<T: Scalar, const N: usize, Space> Covariance<T, N, Space> {
    /// Wraps a raw matrix. The caller is responsible for it being symmetric
    /// positive semi-definite.
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, N, N>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, N, N> {
        &self.inner
    }
}

impl<T: Scalar + Copy, const N: usize, Space: Clone> Copy for Covariance<T, N, Space> where
    SMatrix<T, N, N>: Copy
{
}

impl<T: RealField + Copy, const N: usize, Space> Covariance<T, N, Space> {
    #[inline]
    pub fn zeros() -> Self {
        Self::from_matrix(SMatrix::zeros())
    }

    #[inline]
    pub fn identity() -> Self {
        Self::from_matrix(SMatrix::identity())
    }

    #[inline]
    pub fn from_diagonal(diag: &SVector<T, N>) -> Self {
        Self::from_matrix(SMatrix::from_diagonal(diag))
    }

    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self::from_matrix(self.inner.scale(s))
    }

    #[inline]
    pub fn add(&self, other: &Self) -> Self {
        Self::from_matrix(self.inner + other.inner)
    }

    #[inline]
    pub fn trace(&self) -> T {
        self.inner.trace()
    }

    /// Returns `(A + A^T) / 2`.
    ///
    /// Removes the asymmetry that accumulates from floating-point round-off in
    /// congruence products.
    #[inline]
    pub fn symmetrized(&self) -> Self {
        let half = T::one() / (T::one() + T::one());
        Self::from_matrix((self.inner + self.inner.transpose()).scale(half))
    }

    /// Largest absolute difference between the matrix and its transpose.
    pub fn asymmetry(&self) -> T {
        let mut worst = T::zero();
        for i in 0..N {
            for j in (i + 1)..N {
                let diff = (self.inner[(i, j)] - self.inner[(j, i)]).abs();
                if diff > worst {
                    worst = diff;
                }
            }
        }
        worst
    }
}

impl<T: RealField + Copy, const N: usize, Space> Add for Covariance<T, N, Space> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::from_matrix(self.inner + rhs.inner)
    }
}

// ============================================================================
// Type Aliases for Covariance
// ============================================================================

/// Covariance matrix in state space.
pub type StateCovariance<T, const N: usize> = Covariance<T, N, StateSpace>;

/// Covariance matrix in measurement space.
///
/// The innovation covariance S = H*P*H' + R is also kept in this type, as is
/// customary in the Kalman filter literature.
pub type MeasurementCovariance<T, const M: usize> = Covariance<T, M, MeasurementSpace>;

/// Covariance of the acceleration disturbance (the per-mode process noise Q).
pub type DisturbanceCovariance<T, const D: usize> = Covariance<T, D, DisturbanceSpace>;
