use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distance below which a live descriptor is considered the enrolled face.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Label reported when the best match is not close enough to the enrollment.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Minimum rendered width of the confidence bar, in percent.
pub const DISPLAY_FLOOR_PERCENT: i32 = 5;

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// Bounding box for a detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;
        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor length mismatch: {probe} vs {reference}")]
    DimensionMismatch { probe: usize, reference: usize },
    #[error("descriptor is empty")]
    Empty,
}

/// Fixed-length face embedding produced by the embedding provider.
///
/// Immutable once built; the values are only reachable through a shared slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    values: Vec<f32>,
    /// Model that produced this descriptor (e.g., "w600k_r50").
    model_version: Option<String>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    /// Euclidean distance to another descriptor of the same length.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> Result<f32, DescriptorError> {
        if self.is_empty() || other.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if self.len() != other.len() {
            return Err(DescriptorError::DimensionMismatch {
                probe: self.len(),
                reference: other.len(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

/// A single face found by the embedding provider.
#[derive(Debug, Clone)]
pub struct Detection {
    pub descriptor: FaceDescriptor,
    pub bbox: BoundingBox,
    pub landmarks: Option<Landmarks>,
}

/// The one labelled reference descriptor live frames are compared against.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentRecord {
    pub label: String,
    pub descriptor: FaceDescriptor,
    pub enrolled_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    pub fn new(label: impl Into<String>, descriptor: FaceDescriptor) -> Self {
        Self {
            label: label.into(),
            descriptor,
            enrolled_at: Utc::now(),
        }
    }
}

/// Outcome of comparing one live descriptor against the enrollment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub label: String,
    pub distance: f32,
    pub percentage: i32,
    pub is_match: bool,
}

impl MatchResult {
    /// Width of the confidence bar. Floors at [`DISPLAY_FLOOR_PERCENT`];
    /// the stored percentage is never floored.
    pub fn display_percentage(&self) -> i32 {
        self.percentage.max(DISPLAY_FLOOR_PERCENT)
    }
}

/// `round((1 - distance) * 100)`.
pub fn match_percentage(distance: f32) -> i32 {
    ((1.0 - distance) * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0 }
    }

    #[test]
    fn test_distance_identical() {
        let a = FaceDescriptor::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a.clone()).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        let a = FaceDescriptor::new(vec![0.0, 0.0]);
        let b = FaceDescriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = FaceDescriptor::new(vec![0.0; 128]);
        let b = FaceDescriptor::new(vec![0.0; 512]);
        assert_eq!(
            a.euclidean_distance(&b),
            Err(DescriptorError::DimensionMismatch { probe: 128, reference: 512 })
        );
    }

    #[test]
    fn test_distance_empty() {
        let a = FaceDescriptor::new(vec![]);
        let b = FaceDescriptor::new(vec![1.0]);
        assert_eq!(a.euclidean_distance(&b), Err(DescriptorError::Empty));
    }

    #[test]
    fn test_match_percentage_reference_points() {
        assert_eq!(match_percentage(0.0), 100);
        assert_eq!(match_percentage(0.25), 75);
        assert_eq!(match_percentage(1.0), 0);
    }

    #[test]
    fn test_display_floor_does_not_touch_stored_value() {
        let result = MatchResult {
            label: UNKNOWN_LABEL.into(),
            distance: 1.2,
            percentage: match_percentage(1.2),
            is_match: false,
        };
        assert_eq!(result.percentage, -20);
        assert_eq!(result.display_percentage(), DISPLAY_FLOOR_PERCENT);
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!(a.iou(&bbox(20.0, 20.0, 10.0, 10.0)).abs() < 1e-6);
        // Overlap 5x10 = 50, union 150
        assert!((a.iou(&bbox(5.0, 0.0, 10.0, 10.0)) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_model_version_tag() {
        let d = FaceDescriptor::new(vec![1.0]).with_model_version("w600k_r50");
        assert_eq!(d.model_version(), Some("w600k_r50"));
    }
}
