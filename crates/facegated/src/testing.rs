//! Test doubles for the engine's provider and camera.

use crate::engine::{CameraOpener, ProviderLoader};
use facegate_core::{BoundingBox, Detection, EmbeddingProvider, FaceDescriptor, Frame, ProviderError};
use facegate_hw::{CameraError, FrameSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

pub fn descriptor(values: &[f32]) -> FaceDescriptor {
    FaceDescriptor::new(values.to_vec())
}

fn detection(descriptor: FaceDescriptor) -> Detection {
    Detection {
        descriptor,
        bbox: BoundingBox { x: 0.0, y: 0.0, width: 4.0, height: 4.0, confidence: 0.99 },
        landmarks: None,
    }
}

/// A small PNG for upload paths; its content is ignored by the fake providers.
pub fn png_bytes() -> Vec<u8> {
    let img = image::GrayImage::from_pixel(8, 8, image::Luma([128]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Always reports the same face (or no face).
pub struct FixedProvider {
    descriptor: Option<FaceDescriptor>,
    calls: Arc<AtomicUsize>,
}

impl FixedProvider {
    pub fn loader(descriptor: Option<FaceDescriptor>) -> ProviderLoader {
        Self::counted_loader(descriptor, Arc::new(AtomicUsize::new(0)))
    }

    pub fn counted_loader(descriptor: Option<FaceDescriptor>, calls: Arc<AtomicUsize>) -> ProviderLoader {
        Box::new(move || Ok(Box::new(FixedProvider { descriptor, calls }) as Box<dyn EmbeddingProvider>))
    }
}

impl EmbeddingProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Option<Detection>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.descriptor.clone().map(detection))
    }
}

/// Blocks every detection until the test sends on the release channel
/// (or drops it).
pub struct GatedProvider {
    descriptor: FaceDescriptor,
    calls: Arc<AtomicUsize>,
    release: mpsc::Receiver<()>,
}

impl GatedProvider {
    pub fn loader(descriptor: FaceDescriptor) -> (ProviderLoader, Arc<AtomicUsize>, mpsc::Sender<()>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release) = mpsc::channel();
        let counted = calls.clone();
        let loader: ProviderLoader = Box::new(move || {
            Ok(Box::new(GatedProvider { descriptor, calls: counted, release }) as Box<dyn EmbeddingProvider>)
        });
        (loader, calls, release_tx)
    }
}

impl EmbeddingProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Option<Detection>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.release.recv();
        Ok(Some(detection(self.descriptor.clone())))
    }
}

/// A camera that always has a mid-gray frame ready.
pub struct StaticSource {
    released: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn opener() -> CameraOpener {
        Self::opener_counting(Arc::new(AtomicUsize::new(0)))
    }

    pub fn opener_counting(released: Arc<AtomicUsize>) -> CameraOpener {
        Box::new(move || Ok(Some(Box::new(StaticSource { released }) as Box<dyn FrameSource>)))
    }
}

impl FrameSource for StaticSource {
    fn describe(&self) -> String {
        "static".into()
    }

    fn capture(&mut self) -> Result<Option<Frame>, CameraError> {
        Frame::from_gray(vec![128; 64], 8, 8)
            .map(Some)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
