use crate::camera::CameraError;
use facegate_core::Frame;

/// Anything that can hand the match loop a live grayscale frame.
pub trait FrameSource: Send {
    /// Human-readable identity for logs and status (e.g., the device path).
    fn describe(&self) -> String;

    /// Grab the current frame.
    ///
    /// `Ok(None)` means the stream is up but not ready yet (dark or warming up).
    fn capture(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Stop streaming and give the device back. Later captures fail.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn capture(&mut self) -> Result<Option<Frame>, CameraError> {
        (**self).capture()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
