//! Runtime-adjustable recognition threshold.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub const DEFAULT_THRESHOLD: f64 = 0.6;
pub const MIN_THRESHOLD: f64 = 0.1;
pub const MAX_THRESHOLD: f64 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("recognition threshold must be between {MIN_THRESHOLD} and {MAX_THRESHOLD}, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("cooldown must be greater than zero")]
    ZeroCooldown,
}

/// Maximum accepted encoding distance, shared between the settings
/// surface and every matcher call.
///
/// Stored as `f64` bits so readers on the frame path never take a lock.
#[derive(Debug)]
pub struct RecognitionThreshold {
    bits: AtomicU64,
}

impl RecognitionThreshold {
    pub fn new(value: f64) -> Result<Self, SettingsError> {
        validate(value)?;
        Ok(Self { bits: AtomicU64::new(value.to_bits()) })
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Replace the threshold. Out-of-range values leave it unchanged.
    pub fn set(&self, value: f64) -> Result<(), SettingsError> {
        if let Err(e) = validate(value) {
            tracing::warn!(value, current = self.get(), "rejected recognition threshold");
            return Err(e);
        }
        let previous = f64::from_bits(self.bits.swap(value.to_bits(), Ordering::AcqRel));
        tracing::info!(previous, value, "updated recognition threshold");
        Ok(())
    }
}

impl Default for RecognitionThreshold {
    fn default() -> Self {
        Self { bits: AtomicU64::new(DEFAULT_THRESHOLD.to_bits()) }
    }
}

fn validate(value: f64) -> Result<(), SettingsError> {
    // NaN fails the range check too.
    if (MIN_THRESHOLD..=MAX_THRESHOLD).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::ThresholdOutOfRange(value))
    }
}
