//! Raw capture buffer → 8-bit grayscale conversions.

use crate::camera::CameraError;

/// Packed YUYV (4:2:2): [Y0, U, Y1, V] per two pixels; keep the Y bytes.
pub fn yuyv_to_gray(buf: &[u8], pixels: usize) -> Result<Vec<u8>, CameraError> {
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(short_buffer("YUYV", expected, buf.len()));
    }
    Ok(buf[..expected].iter().step_by(2).copied().collect())
}

/// 16-bit little-endian gray, downscaled to the high byte.
pub fn y16_to_gray(buf: &[u8], pixels: usize) -> Result<Vec<u8>, CameraError> {
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(short_buffer("Y16", expected, buf.len()));
    }
    Ok(buf[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

pub fn grey_to_gray(buf: &[u8], pixels: usize) -> Result<Vec<u8>, CameraError> {
    if buf.len() < pixels {
        return Err(short_buffer("GREY", pixels, buf.len()));
    }
    Ok(buf[..pixels].to_vec())
}

fn short_buffer(format: &str, expected: usize, actual: usize) -> CameraError {
    CameraError::CaptureFailed(format!(
        "{format} buffer too short: expected {expected}, got {actual}"
    ))
}
