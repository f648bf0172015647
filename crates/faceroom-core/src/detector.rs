//! Face detection capability.
//!
//! The detection and encoding model lives outside this crate. Backends
//! plug in through [`FaceDetector`].

use crate::types::{FaceBox, FaceEncoding};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("invalid input image: {0}")]
    InvalidInput(String),
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// Faces found in one image.
///
/// `encodings[i]` belongs to `boxes[i]`. A backend may report boxes without
/// encodings when it could not compute a usable vector.
#[derive(Debug, Clone, Default)]
pub struct Detections {
    pub boxes: Vec<FaceBox>,
    pub encodings: Vec<FaceEncoding>,
}

impl Detections {
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// A face detector + encoder.
///
/// "No face found" is an empty [`Detections`], not an error. Errors are
/// reserved for input the backend cannot process at all.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Detections, DetectError>;
}

/// Reject images no backend can process.
pub fn validate_input(image: &RgbImage) -> Result<(), DetectError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(DetectError::InvalidInput(format!(
            "zero-size image {}x{}",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Detector that never finds a face. Used when no backend is configured.
pub struct NullDetector;

impl FaceDetector for NullDetector {
    fn detect(&self, image: &RgbImage) -> Result<Detections, DetectError> {
        validate_input(image)?;
        Ok(Detections::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_detector_finds_nothing() {
        let img = RgbImage::new(32, 24);
        let d = NullDetector.detect(&img).unwrap();
        assert!(d.is_empty());
        assert!(d.encodings.is_empty());
    }

    #[test]
    fn test_zero_size_image_rejected() {
        let img = RgbImage::new(0, 0);
        assert!(matches!(
            NullDetector.detect(&img),
            Err(DetectError::InvalidInput(_))
        ));
    }
}
