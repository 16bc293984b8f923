use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedding dimensionality of the default extraction model.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Face embedding vector. Dimensionality is fixed by the extraction model
/// (128 for the default model); mixed-dimension comparisons are a bug, so
/// anything crossing a serialization boundary goes through [`Embedding::checked`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Construct with dimensionality validation. Fails fast on a length
    /// mismatch rather than silently producing wrong distances downstream.
    pub fn checked(values: Vec<f32>, expected_dim: usize) -> Result<Self, EmbeddingError> {
        if values.len() != expected_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: expected_dim,
                got: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding of the same dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A registered person with their accumulated embeddings.
///
/// Embeddings accumulate monotonically across repeated registrations —
/// appended, never replaced. A successfully registered identity always has
/// at least one embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    /// Opaque unique identity key (student identifier).
    pub student_id: String,
    pub name: String,
    /// Reference to a thumbnail image, resolved by the caller.
    pub thumbnail: Option<String>,
    pub embeddings: Vec<Embedding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_distance_identical() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(a.euclidean_distance(&b), 0.0);
    }

    #[test]
    fn euclidean_distance_unit_axes() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn checked_rejects_wrong_dimension() {
        let err = Embedding::checked(vec![1.0, 2.0], 128).unwrap_err();
        match err {
            EmbeddingError::DimensionMismatch { expected, got } => {
                assert_eq!(expected, 128);
                assert_eq!(got, 2);
            }
        }
    }

    #[test]
    fn checked_accepts_exact_dimension() {
        let e = Embedding::checked(vec![0.5; 128], 128).unwrap();
        assert_eq!(e.dim(), 128);
    }

    #[test]
    fn embedding_json_round_trip() {
        let e = Embedding::new(vec![0.125, -3.5, 1e-7]);
        let json = serde_json::to_string(&e).unwrap();
        // #[serde(transparent)] — stored as a bare array
        assert!(json.starts_with('['));
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
