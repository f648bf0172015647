//! Capture device abstraction used by the camera manager.

use crate::camera::CameraError;
use crate::frame::Frame;

/// An open capture device. One reader at a time.
pub trait CaptureDevice: Send {
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// False once the device is known to be unusable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Opens capture devices by numeric id.
pub trait CaptureBackend: Send + Sync + 'static {
    type Device: CaptureDevice + 'static;

    fn open(&self, device_id: u32) -> Result<Self::Device, CameraError>;
}
