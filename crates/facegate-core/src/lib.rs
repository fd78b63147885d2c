//! facegate-core: face descriptors, matching, and the embedding provider.
//!
//! The provider contract lives in [`provider`]; [`OnnxProvider`] implements it
//! with SCRFD detection and ArcFace descriptors running on ONNX Runtime.

pub mod alignment;
pub mod detector;
pub mod frame;
pub mod matcher;
pub mod onnx;
pub mod provider;
pub mod recognizer;
pub mod types;

pub use frame::{Frame, FrameError};
pub use matcher::{EuclideanMatcher, Matcher, TriggerPolicy};
pub use onnx::OnnxProvider;
pub use provider::{EmbeddingProvider, ProviderError};
pub use types::{
    BoundingBox, DescriptorError, Detection, EnrollmentRecord, FaceDescriptor, Landmarks,
    MatchResult,
};

use std::path::PathBuf;

/// Default directory searched for the ONNX model bundle.
///
/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
        .join("models")
}
