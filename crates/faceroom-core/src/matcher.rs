//! Nearest-neighbour matching of a candidate encoding against enrolled faces.

use crate::types::{EnrollmentRecord, FaceEncoding, MatchOutcome};

/// Strategy for comparing a candidate encoding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(
        &self,
        candidate: &FaceEncoding,
        gallery: &[EnrollmentRecord],
        threshold: f64,
    ) -> MatchOutcome;
}

/// Euclidean distance matcher.
///
/// An entry becomes the best match only if it is strictly closer than the
/// current best *and* within `threshold`. Equal distances keep the entry
/// seen first, so gallery order (insertion order) breaks ties.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        candidate: &FaceEncoding,
        gallery: &[EnrollmentRecord],
        threshold: f64,
    ) -> MatchOutcome {
        if gallery.is_empty() {
            return MatchOutcome::Unknown;
        }

        let mut best_distance = f64::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            let distance = candidate.euclidean_distance(&record.encoding);
            if distance < best_distance && distance <= threshold {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) => MatchOutcome::Matched {
                user_id: gallery[idx].user_id.clone(),
                distance: best_distance,
            },
            None => MatchOutcome::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ENCODING_DIM;

    /// Encoding whose distance from the zero vector is exactly `d`.
    fn at_distance(d: f64) -> FaceEncoding {
        let mut values = vec![0.0; ENCODING_DIM];
        values[0] = d;
        FaceEncoding::new(values).unwrap()
    }

    fn record(user: &str, encoding: FaceEncoding) -> EnrollmentRecord {
        EnrollmentRecord { user_id: user.into(), encoding }
    }

    fn origin() -> FaceEncoding {
        at_distance(0.0)
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        assert_eq!(EuclideanMatcher.compare(&origin(), &[], 0.6), MatchOutcome::Unknown);
    }

    #[test]
    fn test_closest_within_threshold_wins() {
        let gallery = vec![
            record("far", at_distance(0.5)),
            record("near", at_distance(0.3)),
        ];
        let outcome = EuclideanMatcher.compare(&origin(), &gallery, 0.6);
        assert_eq!(outcome.user_id(), Some("near"));
        match outcome {
            MatchOutcome::Matched { distance, .. } => assert!((distance - 0.3).abs() < 1e-12),
            MatchOutcome::Unknown => panic!("expected a match"),
        }
    }

    #[test]
    fn test_closest_outside_threshold_is_unknown() {
        let gallery = vec![record("only", at_distance(0.8))];
        assert_eq!(
            EuclideanMatcher.compare(&origin(), &gallery, 0.6),
            MatchOutcome::Unknown
        );
    }

    #[test]
    fn test_distance_equal_to_threshold_matches() {
        let gallery = vec![record("edge", at_distance(0.5))];
        let outcome = EuclideanMatcher.compare(&origin(), &gallery, 0.5);
        assert_eq!(outcome.user_id(), Some("edge"));
    }

    #[test]
    fn test_tie_resolves_to_first_enrolled() {
        let gallery = vec![
            record("first", at_distance(0.4)),
            record("second", at_distance(0.4)),
        ];
        let outcome = EuclideanMatcher.compare(&origin(), &gallery, 0.6);
        assert_eq!(outcome.user_id(), Some("first"));
    }

    #[test]
    fn test_rejected_entry_does_not_block_later_match() {
        let gallery = vec![
            record("rejected", at_distance(0.8)),
            record("accepted", at_distance(0.5)),
        ];
        let outcome = EuclideanMatcher.compare(&origin(), &gallery, 0.6);
        assert_eq!(outcome.user_id(), Some("accepted"));
    }
}
