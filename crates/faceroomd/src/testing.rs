//! Fake capture backend and detector shared by the daemon's unit tests.

use faceroom_core::detector::{DetectError, Detections, FaceDetector};
use faceroom_core::{FaceBox, FaceEncoding, ENCODING_DIM};
use faceroom_hw::{CameraError, CaptureBackend, CaptureDevice, Frame};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct CameraState {
    pub fail_open: AtomicBool,
    pub fail_read: AtomicBool,
    pub opens: AtomicUsize,
    sequence: AtomicU32,
}

/// Produces solid grey 640x480 frames that brighten with each sequence number.
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub state: Arc<CameraState>,
}

pub struct FakeCamera {
    state: Arc<CameraState>,
}

impl CaptureDevice for FakeCamera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        if self.state.fail_read.load(Ordering::SeqCst) {
            return Err(CameraError::CaptureFailed("fake read failure".into()));
        }
        let seq = self.state.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let level = seq.saturating_mul(12).min(255) as u8;
        Ok(Frame::new(RgbImage::from_pixel(640, 480, Rgb([level; 3])), seq))
    }
}

impl CaptureBackend for FakeBackend {
    type Device = FakeCamera;

    fn open(&self, device_id: u32) -> Result<FakeCamera, CameraError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(CameraError::DeviceNotFound(format!("/dev/video{device_id}")));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeCamera { state: Arc::clone(&self.state) })
    }
}

/// Detector returning a fixed result and recording the size of every image it saw.
#[derive(Default)]
pub struct ScriptedDetector {
    pub result: Mutex<Detections>,
    pub seen_sizes: Mutex<Vec<(u32, u32)>>,
    pub panic: AtomicBool,
}

impl ScriptedDetector {
    pub fn with(boxes: Vec<FaceBox>, encodings: Vec<FaceEncoding>) -> Self {
        Self {
            result: Mutex::new(Detections { boxes, encodings }),
            ..Self::default()
        }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&self, image: &RgbImage) -> Result<Detections, DetectError> {
        if self.panic.load(Ordering::SeqCst) {
            panic!("detector exploded");
        }
        self.seen_sizes.lock().push(image.dimensions());
        Ok(self.result.lock().clone())
    }
}

/// Encoding at distance `d` from [`origin`].
pub fn encoding_at(d: f64) -> FaceEncoding {
    let mut values = vec![0.0; ENCODING_DIM];
    values[0] = d;
    FaceEncoding::new(values).unwrap()
}

pub fn origin() -> FaceEncoding {
    encoding_at(0.0)
}
