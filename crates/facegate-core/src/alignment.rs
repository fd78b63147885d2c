//! Face alignment to the canonical ArcFace crop.
//!
//! Fits a similarity transform (scale, rotation, translation) from detected
//! landmarks to the five InsightFace reference points, then resamples the
//! frame into a 112×112 crop.

use crate::types::Landmarks;
use image::imageops::interpolate_bilinear;
use image::{GrayImage, Luma};

/// Side length of the aligned crop.
pub const ALIGNED_SIZE: u32 = 112;

/// ArcFace reference landmarks for a 112×112 crop.
pub const REFERENCE_LANDMARKS: Landmarks = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// `p' = [[a, -b], [b, a]] * p + t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit mapping `src` onto `dst`.
    ///
    /// Returns `None` when the source points are degenerate (all coincident).
    pub fn estimate(src: &Landmarks, dst: &Landmarks) -> Option<Self> {
        let n = src.len() as f32;
        let centroid = |pts: &Landmarks| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (scx, scy) = centroid(src);
        let (dcx, dcy) = centroid(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (px, py) = (sx - scx, sy - scy);
            let (qx, qy) = (dx - dcx, dy - dcy);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            norm += px * px + py * py;
        }
        if norm < 1e-9 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        Some(Self {
            a,
            b,
            tx: dcx - (a * scx - b * scy),
            ty: dcy - (b * scx + a * scy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Warp the face described by `landmarks` into a 112×112 aligned crop.
///
/// Pixels that map outside the source image are black. A degenerate landmark
/// set yields an all-black crop.
pub fn align_face(image: &GrayImage, landmarks: &Landmarks) -> GrayImage {
    let Some(to_source) =
        Similarity::estimate(landmarks, &REFERENCE_LANDMARKS).and_then(|t| t.inverse())
    else {
        return GrayImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };

    GrayImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| {
        let (sx, sy) = to_source.apply((x as f32, y as f32));
        interpolate_bilinear(image, sx, sy).unwrap_or(Luma([0]))
    })
}
