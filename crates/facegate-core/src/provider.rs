//! The embedding provider contract.

use crate::frame::{Frame, FrameError};
use crate::types::Detection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("model file not found: {0}; place the model bundle in the model directory")]
    ModelNotFound(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Produces at most one face detection, with descriptor, per frame.
///
/// Implementations may hold inference sessions that need exclusive access,
/// so `detect` takes `&mut self`; callers serialize access.
pub trait EmbeddingProvider: Send {
    /// Short identifier for logs and status output.
    fn name(&self) -> &str;

    /// Detect the most prominent face and compute its descriptor.
    ///
    /// `Ok(None)` means the frame held no face, which is not an error.
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>, ProviderError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>, ProviderError> {
        (**self).detect(frame)
    }
}
