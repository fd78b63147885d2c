//! ArcFace descriptor extraction via ONNX Runtime.
//!
//! Produces L2-normalized 512-dimensional descriptors from aligned crops,
//! using the w600k_r50 ArcFace model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::provider::ProviderError;
use crate::types::{FaceDescriptor, Landmarks};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
pub const ARCFACE_DESCRIPTOR_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// ArcFace-based descriptor extractor.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ProviderError> {
        if !model_path.exists() {
            return Err(ProviderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded ArcFace model");
        Ok(Self { session })
    }

    /// Align the face at `landmarks` and compute its descriptor.
    pub fn extract(
        &mut self,
        image: &GrayImage,
        landmarks: &Landmarks,
    ) -> Result<FaceDescriptor, ProviderError> {
        let aligned = alignment::align_face(image, landmarks);
        let input = to_tensor(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        if raw.len() != ARCFACE_DESCRIPTOR_DIM {
            return Err(ProviderError::InferenceFailed(format!(
                "expected {ARCFACE_DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(FaceDescriptor::new(l2_normalize(raw)).with_model_version(ARCFACE_MODEL_VERSION))
    }
}

/// Aligned grayscale crop → NCHW tensor with the gray value replicated to RGB.
fn to_tensor(aligned: &GrayImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        let value = (pixel.0[0] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = value;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
