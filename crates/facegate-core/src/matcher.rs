//! Descriptor comparison and the verification trigger policy.

use crate::types::{
    match_percentage, DescriptorError, EnrollmentRecord, FaceDescriptor, MatchResult,
    UNKNOWN_LABEL,
};
use serde::{Deserialize, Serialize};

/// Strategy for comparing a probe descriptor against the enrolled face.
pub trait Matcher {
    fn compare(
        &self,
        probe: &FaceDescriptor,
        enrolled: &EnrollmentRecord,
        threshold: f32,
    ) -> Result<MatchResult, DescriptorError>;
}

/// Euclidean distance matcher.
///
/// The best-match label is the enrolled label when the distance is under the
/// threshold and [`UNKNOWN_LABEL`] otherwise.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &FaceDescriptor,
        enrolled: &EnrollmentRecord,
        threshold: f32,
    ) -> Result<MatchResult, DescriptorError> {
        let distance = probe.euclidean_distance(&enrolled.descriptor)?;
        let within = distance < threshold;
        let label = if within {
            enrolled.label.clone()
        } else {
            UNKNOWN_LABEL.to_string()
        };

        Ok(MatchResult {
            is_match: is_match(&label, &enrolled.label, distance, threshold),
            label,
            distance,
            percentage: match_percentage(distance),
        })
    }
}

/// A match needs both the enrolled label and a distance under the threshold.
pub fn is_match(label: &str, enrolled_label: &str, distance: f32, threshold: f32) -> bool {
    label == enrolled_label && label != UNKNOWN_LABEL && distance < threshold
}

/// Decides when a match is strong enough to mark the session verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPolicy {
    /// Minimum match percentage, applied on top of `is_match`.
    pub min_percentage: i32,
}

impl TriggerPolicy {
    /// Only a perfect (100%) match verifies.
    pub const PERFECT: TriggerPolicy = TriggerPolicy { min_percentage: 100 };
    /// Any match under the distance threshold verifies.
    pub const ANY_MATCH: TriggerPolicy = TriggerPolicy { min_percentage: i32::MIN };

    pub fn should_trigger(&self, result: &MatchResult) -> bool {
        result.is_match && result.percentage >= self.min_percentage
    }
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self::PERFECT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_MATCH_THRESHOLD;

    fn enrolled(values: Vec<f32>) -> EnrollmentRecord {
        EnrollmentRecord::new("User", FaceDescriptor::new(values))
    }

    #[test]
    fn test_far_descriptor_never_matches() {
        let record = enrolled(vec![0.0, 0.0]);
        for d in [0.5f32, 0.6, 1.0, 2.5] {
            let probe = FaceDescriptor::new(vec![d, 0.0]);
            let result = EuclideanMatcher
                .compare(&probe, &record, DEFAULT_MATCH_THRESHOLD)
                .unwrap();
            assert!(!result.is_match, "distance {d} must not match");
            assert_eq!(result.label, UNKNOWN_LABEL);
        }
    }

    #[test]
    fn test_near_descriptor_matches() {
        let record = enrolled(vec![0.0, 0.0]);
        for d in [0.0f32, 0.1, 0.25, 0.49] {
            let probe = FaceDescriptor::new(vec![0.0, d]);
            let result = EuclideanMatcher
                .compare(&probe, &record, DEFAULT_MATCH_THRESHOLD)
                .unwrap();
            assert!(result.is_match, "distance {d} must match");
            assert_eq!(result.label, "User");
        }
    }

    #[test]
    fn test_is_match_requires_label() {
        assert!(!is_match("someone", "User", 0.1, 0.5));
        assert!(!is_match(UNKNOWN_LABEL, UNKNOWN_LABEL, 0.1, 0.5));
        assert!(is_match("User", "User", 0.1, 0.5));
        assert!(!is_match("User", "User", 0.5, 0.5));
    }

    #[test]
    fn test_percentage_follows_distance() {
        let record = enrolled(vec![0.0]);
        let result = EuclideanMatcher
            .compare(&FaceDescriptor::new(vec![0.25]), &record, 0.5)
            .unwrap();
        assert_eq!(result.percentage, 75);
    }

    #[test]
    fn test_dimension_mismatch_propagates() {
        let record = enrolled(vec![0.0; 4]);
        let err = EuclideanMatcher
            .compare(&FaceDescriptor::new(vec![0.0; 3]), &record, 0.5)
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_trigger_policy_perfect() {
        let exact = MatchResult { label: "User".into(), distance: 0.0, percentage: 100, is_match: true };
        let close = MatchResult { label: "User".into(), distance: 0.2, percentage: 80, is_match: true };
        assert!(TriggerPolicy::PERFECT.should_trigger(&exact));
        assert!(!TriggerPolicy::PERFECT.should_trigger(&close));
        assert!(TriggerPolicy::ANY_MATCH.should_trigger(&close));
    }

    #[test]
    fn test_trigger_policy_requires_match() {
        let miss = MatchResult { label: UNKNOWN_LABEL.into(), distance: 0.0, percentage: 100, is_match: false };
        assert!(!TriggerPolicy::ANY_MATCH.should_trigger(&miss));
    }
}
