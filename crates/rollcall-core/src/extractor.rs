//! Embedding extraction seam.
//!
//! Turning an image into fixed-length face embeddings is an external
//! capability (an ONNX model, a remote service, ...). The core only
//! consumes it through [`EmbeddingExtractor`].

use thiserror::Error;

use crate::types::{Embedding, EmbeddingError};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("embedding extraction failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Dimension(#[from] EmbeddingError),
}

/// External face-embedding capability.
///
/// Returns one embedding per detected face, in detection order. A
/// structurally valid image with no face yields an empty vec — that is a
/// normal outcome, not an error. `&mut self` because model sessions are
/// typically exclusive.
pub trait EmbeddingExtractor: Send {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<Embedding>, ExtractError>;
}

/// Extractor for pre-extracted embeddings: the "image" bytes are a JSON
/// array of fixed-length float arrays, one per face. Used by the admin CLI
/// and by tests, where no inference model is available.
pub struct PrecomputedExtractor {
    embedding_dim: usize,
}

impl PrecomputedExtractor {
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }
}

impl EmbeddingExtractor for PrecomputedExtractor {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<Embedding>, ExtractError> {
        let vectors: Vec<Vec<f32>> = serde_json::from_slice(image)
            .map_err(|e| ExtractError::InvalidImage(e.to_string()))?;
        vectors
            .into_iter()
            .map(|v| Embedding::checked(v, self.embedding_dim).map_err(ExtractError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precomputed_parses_vectors_in_order() {
        let mut extractor = PrecomputedExtractor::new(2);
        let probes = extractor.extract(b"[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].values, vec![1.0, 2.0]);
        assert_eq!(probes[1].values, vec![3.0, 4.0]);
    }

    #[test]
    fn precomputed_empty_array_is_zero_faces_not_error() {
        let mut extractor = PrecomputedExtractor::new(128);
        assert!(extractor.extract(b"[]").unwrap().is_empty());
    }

    #[test]
    fn precomputed_rejects_undecodable_input() {
        let mut extractor = PrecomputedExtractor::new(2);
        assert!(matches!(
            extractor.extract(b"not json"),
            Err(ExtractError::InvalidImage(_))
        ));
    }

    #[test]
    fn precomputed_rejects_wrong_dimension() {
        let mut extractor = PrecomputedExtractor::new(3);
        assert!(matches!(
            extractor.extract(b"[[1.0, 2.0]]"),
            Err(ExtractError::Dimension(_))
        ));
    }
}
