//! Enrollment from a captured image: detect, quality-check, store.

use crate::detector::{DetectError, FaceDetector};
use crate::registry::{EnrollmentRegistry, RegistryError};
use crate::types::{FaceBox, FaceEncoding};
use image::RgbImage;
use thiserror::Error;

/// Face width must be at least this fraction of the image width.
const MIN_FACE_WIDTH_RATIO: f64 = 0.1;
/// Face width must be at most this fraction of the image width.
const MAX_FACE_WIDTH_RATIO: f64 = 0.8;
/// Face centre must lie within this fraction of the image centre, per axis.
const CENTER_TOLERANCE: f64 = 0.3;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no face detected")]
    NoFace,
    #[error("face quality check failed: {0}")]
    Quality(String),
    #[error("face detected but no encoding could be computed")]
    NoEncoding,
    #[error("detector error: {0}")]
    Detector(#[from] DetectError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Check that a detected face is large enough, not too close and roughly centred.
pub fn check_face_quality(image_width: u32, image_height: u32, face: &FaceBox) -> Result<(), String> {
    if image_width == 0 || image_height == 0 {
        return Err("empty image".into());
    }
    let (w, h) = (image_width as f64, image_height as f64);

    let width_ratio = face.width() as f64 / w;
    if width_ratio < MIN_FACE_WIDTH_RATIO {
        return Err(format!("face too small: {width_ratio:.2} < {MIN_FACE_WIDTH_RATIO}"));
    }
    if width_ratio > MAX_FACE_WIDTH_RATIO {
        return Err(format!("face too large: {width_ratio:.2} > {MAX_FACE_WIDTH_RATIO}"));
    }

    let face_cx = (face.left + face.right) as f64 / 2.0;
    let face_cy = (face.top + face.bottom) as f64 / 2.0;
    let x_offset = (face_cx - w / 2.0).abs() / w;
    let y_offset = (face_cy - h / 2.0).abs() / h;
    if x_offset > CENTER_TOLERANCE || y_offset > CENTER_TOLERANCE {
        return Err(format!(
            "face not centered: x_offset={x_offset:.2}, y_offset={y_offset:.2}"
        ));
    }

    Ok(())
}

/// Detect the first face in `image` and enroll it under `user_id`.
///
/// Does not persist; the caller decides when to write the registry.
pub fn enroll_from_image(
    detector: &dyn FaceDetector,
    registry: &EnrollmentRegistry,
    image: &RgbImage,
    user_id: &str,
) -> Result<(), EnrollError> {
    let encoding = enrollment_encoding(detector, image, user_id)?;
    registry.enroll(user_id, encoding)?;
    Ok(())
}

/// Run detection and the quality gate, returning the encoding to enroll.
pub fn enrollment_encoding(
    detector: &dyn FaceDetector,
    image: &RgbImage,
    user_id: &str,
) -> Result<FaceEncoding, EnrollError> {
    if user_id.is_empty() {
        return Err(RegistryError::Invalid("user id must not be empty".into()).into());
    }

    let detections = detector.detect(image)?;
    let face = detections.boxes.first().ok_or(EnrollError::NoFace)?;

    check_face_quality(image.width(), image.height(), face).map_err(|reason| {
        tracing::warn!(user_id, %reason, "face quality check failed");
        EnrollError::Quality(reason)
    })?;

    detections.encodings.into_iter().next().ok_or_else(|| {
        tracing::warn!(user_id, "no face encoding generated");
        EnrollError::NoEncoding
    })
}
