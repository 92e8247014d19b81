//! Nearest-neighbour identity matching with a distance threshold.

use crate::enrollment::Gallery;
use crate::types::{Embedding, LabeledEmbedding, MatchLabel, MatchResult};

/// Default maximum Euclidean distance for a positive match.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

/// Strategy for comparing a probe embedding against labeled references.
pub trait Matcher {
    fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[LabeledEmbedding],
        threshold: f32,
    ) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Every gallery entry is visited. On equal distances the entry that comes
/// first in the gallery wins, so results are reproducible for a given
/// gallery order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match(
        &self,
        probe: &Embedding,
        gallery: &[LabeledEmbedding],
        threshold: f32,
    ) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&entry.embedding);
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_distance <= threshold => MatchResult {
                label: MatchLabel::Identity(gallery[idx].label.clone()),
                distance: best_distance,
            },
            _ => MatchResult::unknown(best_distance),
        }
    }
}

/// A gallery bound to a matching strategy and threshold.
pub struct GalleryMatcher<M = EuclideanMatcher> {
    matcher: M,
    gallery: Gallery,
    threshold: f32,
}

impl GalleryMatcher<EuclideanMatcher> {
    pub fn euclidean(gallery: Gallery, threshold: f32) -> Self {
        Self::new(EuclideanMatcher, gallery, threshold)
    }
}

impl<M: Matcher> GalleryMatcher<M> {
    pub fn new(matcher: M, gallery: Gallery, threshold: f32) -> Self {
        Self {
            matcher,
            gallery,
            threshold,
        }
    }

    pub fn find_best_match(&self, probe: &Embedding) -> MatchResult {
        self.matcher
            .best_match(probe, self.gallery.entries(), self.threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(label: &str, values: Vec<f32>) -> LabeledEmbedding {
        LabeledEmbedding {
            label: label.into(),
            embedding: Embedding::new(values),
        }
    }

    /// Gallery with "near" at distance 0.3 and "far" at 0.8 from the origin probe.
    fn near_far_gallery() -> Vec<LabeledEmbedding> {
        vec![labeled("far", vec![0.8, 0.0]), labeled("near", vec![0.0, 0.3])]
    }

    #[test]
    fn test_threshold_accepts_nearest() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &near_far_gallery(), 0.6);
        assert_eq!(result.identity(), Some("near"));
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_rejects_when_too_far() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &near_far_gallery(), 0.2);
        assert_eq!(result.label, MatchLabel::Unknown);
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_distance_equal_to_threshold_matches() {
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![labeled("edge", vec![0.5])];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.5);
        assert_eq!(result.identity(), Some("edge"));
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &[], 0.6);
        assert_eq!(result.label, MatchLabel::Unknown);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_tie_goes_to_first_entry() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            labeled("first", vec![0.1, 0.0]),
            labeled("second", vec![0.0, 0.1]),
        ];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.identity(), Some("first"));
    }

    #[test]
    fn test_best_match_is_deterministic() {
        let probe = Embedding::new(vec![0.2, 0.1, 0.4]);
        let gallery = vec![
            labeled("a", vec![0.2, 0.1, 0.5]),
            labeled("b", vec![0.3, 0.1, 0.4]),
            labeled("c", vec![0.9, 0.9, 0.9]),
        ];
        let first = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        for _ in 0..10 {
            assert_eq!(EuclideanMatcher.best_match(&probe, &gallery, 0.6), first);
        }
    }

    #[test]
    fn test_best_match_is_last_entry() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            labeled("decoy1", vec![0.0, 1.0, 0.0]),
            labeled("decoy2", vec![0.0, 0.0, 1.0]),
            labeled("match", vec![1.0, 0.0, 0.1]),
        ];
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.6);
        assert_eq!(result.identity(), Some("match"));
    }

    #[test]
    fn test_gallery_matcher_uses_threshold() {
        let gallery = Gallery::new(near_far_gallery()).unwrap();
        let matcher = GalleryMatcher::euclidean(gallery, 0.2);
        assert_eq!(matcher.threshold(), 0.2);
        let result = matcher.find_best_match(&Embedding::new(vec![0.0, 0.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
    }
}
