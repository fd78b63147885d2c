//! [`EmbeddingProvider`] backed by the SCRFD + ArcFace model bundle.

use crate::detector::FaceDetector;
use crate::frame::Frame;
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::recognizer::FaceRecognizer;
use crate::types::Detection;
use std::path::Path;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

pub struct OnnxProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxProvider {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl EmbeddingProvider for OnnxProvider {
    fn name(&self) -> &str {
        "onnx-scrfd-arcface"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>, ProviderError> {
        let Some(face) = self.detector.detect(frame)?.into_iter().next() else {
            return Ok(None);
        };
        let landmarks = face.landmarks.ok_or(ProviderError::NoLandmarks)?;

        let image = frame.to_gray_image().ok_or_else(|| {
            ProviderError::InferenceFailed("frame buffer does not match its dimensions".into())
        })?;
        let descriptor = self.recognizer.extract(&image, &landmarks)?;

        tracing::debug!(
            confidence = face.bbox.confidence,
            dim = descriptor.len(),
            "face detected"
        );

        Ok(Some(Detection {
            descriptor,
            bbox: face.bbox,
            landmarks: Some(landmarks),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_detector_first() {
        let dir = Path::new("/nonexistent/facegate-models");
        match OnnxProvider::load(dir) {
            Err(ProviderError::ModelNotFound(path)) => assert!(path.ends_with(SCRFD_MODEL_FILE)),
            other => panic!("expected ModelNotFound, got {:?}", other.err()),
        }
    }
}
