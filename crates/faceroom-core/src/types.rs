use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of components in a face encoding.
pub const ENCODING_DIM: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("expected {ENCODING_DIM} values, got {0}")]
    WrongLength(usize),
    #[error("value at index {0} is not finite")]
    NotFinite(usize),
}

/// 128-dimensional face feature vector.
///
/// Immutable once constructed. Cloning produces an independent copy.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEncoding {
    values: Vec<f64>,
}

impl FaceEncoding {
    /// Validate and wrap a raw feature vector.
    pub fn new(values: Vec<f64>) -> Result<Self, EncodingError> {
        if values.len() != ENCODING_DIM {
            return Err(EncodingError::WrongLength(values.len()));
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(EncodingError::NotFinite(idx));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Little-endian byte representation (8 bytes per component).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Compute Euclidean distance between two encodings.
    pub fn euclidean_distance(&self, other: &FaceEncoding) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Face bounding box in pixel coordinates, `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self { top, right, bottom, left }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// `right > left` and `bottom > top`.
    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    /// Map a box found on a downscaled image back onto the source frame.
    ///
    /// Coordinates are divided by `factor` and clamped to `width` x `height`.
    /// Returns `None` if the box degenerates after clamping.
    pub fn rescale(&self, factor: f64, width: u32, height: u32) -> Option<FaceBox> {
        let scale = |v: i32, max: u32| -> i32 {
            let scaled = (v as f64 / factor) as i64;
            scaled.clamp(0, max as i64) as i32
        };
        let out = FaceBox {
            top: scale(self.top, height),
            right: scale(self.right, width),
            bottom: scale(self.bottom, height),
            left: scale(self.left, width),
        };
        out.is_valid().then_some(out)
    }
}

/// One enrolled user and their face encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    pub user_id: String,
    pub encoding: FaceEncoding,
}

/// Result of matching a candidate encoding against the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { user_id: String, distance: f64 },
    Unknown,
}

impl MatchOutcome {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            MatchOutcome::Matched { user_id, .. } => Some(user_id),
            MatchOutcome::Unknown => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }

    /// Text drawn next to the face box.
    pub fn label(&self) -> &str {
        self.user_id().unwrap_or("Unknown")
    }
}
