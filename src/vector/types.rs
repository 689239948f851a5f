//! Core value types for vector search.
//!
//! Newtypes keep dimensions and hits from being confused with plain
//! integers and floats.

use crate::error::{RagError, RagResult};
use serde::{Deserialize, Serialize};

/// A fixed-length, L2-normalized embedding.
pub type EmbeddingVector = Vec<f32>;

/// Dimension of all-MiniLM-L6-v2 and e5-small embeddings.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Dimension of e5-large embeddings.
pub const VECTOR_DIMENSION_1024: usize = 1024;

/// Added to the norm before dividing so an all-zero embedding stays finite.
pub const NORM_EPSILON: f32 = 1e-10;

/// Type-safe wrapper for vector dimensions.
///
/// A dimension is never zero; all vectors in one index share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> RagResult<Self> {
        if dim == 0 {
            return Err(RagError::invalid_argument("vector dimension cannot be zero"));
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Creates a 1024-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_1024() -> Self {
        Self(VECTOR_DIMENSION_1024)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    ///
    /// `position` is reported back in the error so callers can locate the
    /// offending row.
    pub fn validate_vector(&self, vector: &[f32], position: usize) -> RagResult<()> {
        if vector.len() != self.0 {
            return Err(RagError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
                position,
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = RagError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(dim: VectorDimension) -> usize {
        dim.0
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One nearest-neighbor hit: raw inner product and the row it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub position: usize,
}

/// Scale a vector to unit length in place.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Inner product of two equal-length vectors.
///
/// On unit vectors this is the cosine similarity, in [-1, 1].
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
