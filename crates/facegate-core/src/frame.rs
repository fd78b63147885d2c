//! Grayscale frames shared by the camera and the embedding provider.

use image::GrayImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("frame buffer length mismatch: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame has zero size")]
    Empty,
}

/// A grayscale image, either captured from the camera or decoded from an upload.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Frame {
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence: 0,
        })
    }

    /// Decode an uploaded image (PNG, JPEG, ...) into a grayscale frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let gray = image::load_from_memory(bytes)?.to_luma8();
        let (width, height) = gray.dimensions();
        Self::from_gray(gray.into_raw(), width, height)
    }

    pub fn to_gray_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// True if more than `threshold_pct` of the pixels fall in the darkest bucket (0–31).
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        if self.data.is_empty() {
            return true;
        }
        let dark = self.data.iter().filter(|&&p| p < 32).count();
        (dark as f32 / self.data.len() as f32) > threshold_pct
    }
}
