//! Nearest-neighbor matching of a probe embedding against the corpus.
//!
//! Exact brute-force scan: every stored embedding of every identity is
//! compared. Corpus sizes are small (one organization), so no indexing
//! structure is warranted.

use crate::types::{Embedding, EnrolledIdentity};

/// Default maximum accepted Euclidean distance for a match.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// The identity a probe resolved to, within tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub student_id: String,
    pub name: String,
    pub thumbnail: Option<String>,
}

/// Result of matching one probe embedding against the corpus.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Present only when the best distance is within tolerance.
    pub identity: Option<MatchCandidate>,
    /// Global minimum distance; `f32::INFINITY` for an empty corpus.
    pub distance: f32,
    /// Heuristic confidence in [0, 100], not a calibrated probability.
    pub confidence_pct: f32,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// Linear mapping of distance to a confidence percentage:
/// distance 0 → 100, distance == tolerance → 0, beyond tolerance → 0.
pub fn confidence_pct(distance: f32, tolerance: f32) -> f32 {
    if tolerance <= 0.0 {
        return 0.0;
    }
    ((tolerance - distance) / tolerance).clamp(0.0, 1.0) * 100.0
}

/// Strategy for resolving a probe embedding to a registered identity.
pub trait Matcher {
    fn match_probe(
        &self,
        probe: &Embedding,
        corpus: &[EnrolledIdentity],
        tolerance: f32,
    ) -> MatchResult;
}

/// Euclidean-distance matcher.
///
/// Per identity, the candidate distance is the minimum over its own
/// embeddings; the global minimum across identities wins. The scan keeps the
/// first strictly smaller distance, so an exact tie resolves to the earliest
/// identity in corpus order — callers provide the corpus sorted by
/// `student_id` ascending, making ties reproducible.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn match_probe(
        &self,
        probe: &Embedding,
        corpus: &[EnrolledIdentity],
        tolerance: f32,
    ) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best: Option<&EnrolledIdentity> = None;

        for identity in corpus {
            // An identity with no embeddings contributes no candidate.
            if identity.embeddings.is_empty() {
                tracing::warn!(
                    student_id = %identity.student_id,
                    "identity has no embeddings, skipping"
                );
                continue;
            }

            let identity_best = identity
                .embeddings
                .iter()
                .map(|e| probe.euclidean_distance(e))
                .fold(f32::INFINITY, f32::min);

            if identity_best < best_distance {
                best_distance = identity_best;
                best = Some(identity);
            }
        }

        let identity = match best {
            Some(id) if best_distance <= tolerance => Some(MatchCandidate {
                student_id: id.student_id.clone(),
                name: id.name.clone(),
                thumbnail: id.thumbnail.clone(),
            }),
            _ => None,
        };

        MatchResult {
            identity,
            distance: best_distance,
            confidence_pct: confidence_pct(best_distance, tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(student_id: &str, embeddings: Vec<Vec<f32>>) -> EnrolledIdentity {
        EnrolledIdentity {
            student_id: student_id.to_string(),
            name: format!("Student {student_id}"),
            thumbnail: None,
            embeddings: embeddings.into_iter().map(Embedding::new).collect(),
        }
    }

    #[test]
    fn accepts_iff_distance_within_tolerance() {
        let corpus = vec![identity("s1", vec![vec![0.0, 0.0]])];
        let matcher = EuclideanMatcher;

        // distance 0.5 with tolerance 0.6 → match
        let result = matcher.match_probe(&Embedding::new(vec![0.5, 0.0]), &corpus, 0.6);
        assert!(result.matched());
        assert!((result.distance - 0.5).abs() < 1e-6);

        // distance 0.5 with tolerance 0.4 → no match, distance still reported
        let result = matcher.match_probe(&Embedding::new(vec![0.5, 0.0]), &corpus, 0.4);
        assert!(!result.matched());
        assert!((result.distance - 0.5).abs() < 1e-6);
        assert_eq!(result.confidence_pct, 0.0);
    }

    #[test]
    fn accepts_distance_exactly_at_tolerance() {
        // 0.5 squares and roots exactly in f32, so the distance is exact
        let corpus = vec![identity("s1", vec![vec![0.0]])];
        let result = EuclideanMatcher.match_probe(&Embedding::new(vec![0.5]), &corpus, 0.5);
        assert!(result.matched());
        assert_eq!(result.confidence_pct, 0.0);
    }

    #[test]
    fn confidence_endpoints_and_monotonicity() {
        assert_eq!(confidence_pct(0.0, 0.6), 100.0);
        assert_eq!(confidence_pct(0.6, 0.6), 0.0);
        assert_eq!(confidence_pct(1.0, 0.6), 0.0);

        // strictly decreasing over [0, tolerance]
        let mut prev = confidence_pct(0.0, 0.6);
        for i in 1..=10 {
            let d = 0.6 * i as f32 / 10.0;
            let c = confidence_pct(d, 0.6);
            assert!(c < prev, "confidence must decrease: d={d} c={c} prev={prev}");
            prev = c;
        }
    }

    #[test]
    fn identity_best_is_min_over_its_own_embeddings() {
        // Far embedding first; the closer second embedding must win.
        let corpus = vec![identity("s1", vec![vec![10.0, 0.0], vec![0.1, 0.0]])];
        let result = EuclideanMatcher.match_probe(&Embedding::new(vec![0.0, 0.0]), &corpus, 0.6);
        assert!(result.matched());
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn global_minimum_across_identities_wins() {
        let corpus = vec![
            identity("s1", vec![vec![0.5, 0.0]]),
            identity("s2", vec![vec![0.2, 0.0]]),
        ];
        let result = EuclideanMatcher.match_probe(&Embedding::new(vec![0.0, 0.0]), &corpus, 0.6);
        assert_eq!(
            result.identity.as_ref().map(|c| c.student_id.as_str()),
            Some("s2")
        );
    }

    #[test]
    fn exact_tie_resolves_to_first_in_corpus_order() {
        let corpus = vec![
            identity("s1", vec![vec![0.3, 0.0]]),
            identity("s2", vec![vec![0.3, 0.0]]),
        ];
        let result = EuclideanMatcher.match_probe(&Embedding::new(vec![0.0, 0.0]), &corpus, 0.6);
        assert_eq!(
            result.identity.as_ref().map(|c| c.student_id.as_str()),
            Some("s1")
        );
    }

    #[test]
    fn empty_corpus_is_unmatched_with_zero_confidence() {
        let result = EuclideanMatcher.match_probe(&Embedding::new(vec![1.0]), &[], 0.6);
        assert!(!result.matched());
        assert_eq!(result.distance, f32::INFINITY);
        assert_eq!(result.confidence_pct, 0.0);
    }

    #[test]
    fn identity_with_no_embeddings_is_skipped_not_distance_zero() {
        let corpus = vec![
            identity("s1", vec![]),
            identity("s2", vec![vec![0.1, 0.0]]),
        ];
        let result = EuclideanMatcher.match_probe(&Embedding::new(vec![0.0, 0.0]), &corpus, 0.6);
        assert_eq!(
            result.identity.as_ref().map(|c| c.student_id.as_str()),
            Some("s2")
        );
    }
}
