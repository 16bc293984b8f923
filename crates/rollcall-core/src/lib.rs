//! rollcall-core — Face-embedding matching engine.
//!
//! Brute-force nearest-neighbor search of a probe embedding against the
//! registered corpus, with threshold-gated acceptance and a derived
//! confidence percentage. Embedding extraction (image → vector) is an
//! external capability behind the [`EmbeddingExtractor`] trait.

pub mod extractor;
pub mod matcher;
pub mod types;

pub use extractor::{EmbeddingExtractor, ExtractError, PrecomputedExtractor};
pub use matcher::{EuclideanMatcher, MatchCandidate, MatchResult, Matcher, DEFAULT_TOLERANCE};
pub use types::{Embedding, EmbeddingError, EnrolledIdentity, DEFAULT_EMBEDDING_DIM};
