//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three strides followed by non-maximum suppression.

use crate::frame::Frame;
use crate::provider::ProviderError;
use crate::types::{BoundingBox, Landmarks};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// A face candidate before descriptor extraction.
#[derive(Debug, Clone)]
pub struct FaceCandidate {
    pub bbox: BoundingBox,
    pub landmarks: Option<Landmarks>,
}

/// Scale and padding used to fit a frame into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - new_w) / 2,
            pad_y: (target - new_h) / 2,
            width: new_w,
            height: new_h,
        }
    }

    /// Map a point from model-input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Output tensor positions for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ProviderError> {
        if !model_path.exists() {
            return Err(ProviderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(ProviderError::ModelLoad(format!(
                "SCRFD needs 9 outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }

        let outputs = output_layout(&names);
        tracing::info!(path = %model_path.display(), ?outputs, "loaded SCRFD model");

        Ok(Self { session, outputs })
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceCandidate>, ProviderError> {
        let (input, letterbox) = preprocess(frame)?;
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in self.outputs.iter().zip(SCRFD_STRIDES.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| ProviderError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(slot.score, "scores")?;
            let boxes = extract(slot.bbox, "boxes")?;
            let kps = extract(slot.kps, "landmarks")?;
            candidates.extend(decode_stride(scores, boxes, kps, stride, &letterbox));
        }

        Ok(suppress(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Resize into the letterboxed NCHW input tensor. Padding is left at zero,
/// which is where the mean value lands after normalization.
fn preprocess(frame: &Frame) -> Result<(Array4<f32>, Letterbox), ProviderError> {
    let gray = frame.to_gray_image().ok_or_else(|| {
        ProviderError::InferenceFailed(format!(
            "frame buffer does not match {}x{}",
            frame.width, frame.height
        ))
    })?;
    let letterbox = Letterbox::fit(frame.width, frame.height, SCRFD_INPUT_SIZE);
    let resized = imageops::resize(&gray, letterbox.width, letterbox.height, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = (pixel.0[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
        let (tx, ty) = ((x + letterbox.pad_x) as usize, (y + letterbox.pad_y) as usize);
        for channel in 0..3 {
            tensor[[0, channel, ty, tx]] = value;
        }
    }

    Ok((tensor, letterbox))
}

/// Map output names like "score_8" to stride slots, else assume the standard
/// positional order (scores, then boxes, then landmarks, each 8/16/32).
fn output_layout(names: &[String]) -> [StrideOutputs; 3] {
    let position = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: position("score", stride)?,
                bbox: position("bbox", stride)?,
                kps: position("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            tracing::debug!(?names, "SCRFD output names not recognized, using positional layout");
            std::array::from_fn(|i| StrideOutputs { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<FaceCandidate> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score > SCRFD_CONFIDENCE_THRESHOLD)
        .filter_map(|(idx, &score)| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid_w) as f32 * step;
            let ay = (cell / grid_w) as f32 * step;

            let d = boxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);

            let landmarks: Option<Landmarks> = kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
            });

            Some(FaceCandidate {
                bbox: BoundingBox {
                    x: x1,
                    y: y1,
                    width: x2 - x1,
                    height: y2 - y1,
                    confidence: score,
                },
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn suppress(mut candidates: Vec<FaceCandidate>, iou_threshold: f32) -> Vec<FaceCandidate> {
    candidates.sort_by(|a, b| b.bbox.confidence.total_cmp(&a.bbox.confidence));

    let mut kept: Vec<FaceCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
