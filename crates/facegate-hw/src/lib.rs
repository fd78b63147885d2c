//! facegate-hw: camera capture for the live match loop.
//!
//! V4L2 access via the `v4l` crate, exposed to the daemon through the
//! [`FrameSource`] trait so the loop can run against any frame producer.

pub mod camera;
pub mod pixel;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use source::FrameSource;
