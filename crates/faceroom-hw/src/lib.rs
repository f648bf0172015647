//! faceroom-hw — Camera capture and shared camera handles.
//!
//! Provides V4L2-based camera access, RGB frame conversion, and the
//! per-device handle cache shared by all stream sessions.

pub mod camera;
pub mod device;
pub mod frame;
pub mod manager;

pub use camera::{Camera, CameraError, PixelFormat, V4l2Backend};
pub use device::{CaptureBackend, CaptureDevice};
pub use frame::Frame;
pub use manager::{CameraHandle, CameraManager};
