//! Pipeline and enrollment counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    frames_processed: AtomicU64,
    faces_detected: AtomicU64,
    detection_errors: AtomicU64,
    recognition_matches: AtomicU64,
    encode_errors: AtomicU64,
    alerts_fired: AtomicU64,
    enrollment_attempts: AtomicU64,
    enrollment_success: AtomicU64,
    enrollment_failures: AtomicU64,
    enrollment_duplicates: AtomicU64,
    enrollment_count: AtomicU64,
}

/// Read-only copy of [`Metrics`] plus derived ratios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub faces_detected: u64,
    pub detection_errors: u64,
    pub recognition_matches: u64,
    pub encode_errors: u64,
    pub alerts_fired: u64,
    pub enrollment_attempts: u64,
    pub enrollment_success: u64,
    pub enrollment_failures: u64,
    pub enrollment_duplicates: u64,
    pub enrollment_count: u64,
    pub faces_per_frame: f64,
    pub error_rate: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn faces_detected(&self, count: usize) {
        self.faces_detected.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn detection_error(&self) {
        self.detection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recognition_match(&self) {
        self.recognition_matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_fired(&self) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enrollment_attempt(&self) {
        self.enrollment_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enrollment_succeeded(&self) {
        self.enrollment_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enrollment_failed(&self) {
        self.enrollment_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enrollment_duplicate(&self) {
        self.enrollment_duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Track the current registry size.
    pub fn set_enrollment_count(&self, count: usize) {
        self.enrollment_count.store(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let frames = self.frames_processed.load(Ordering::Relaxed);
        let faces = self.faces_detected.load(Ordering::Relaxed);
        let errors = self.detection_errors.load(Ordering::Relaxed);

        let ratio = |n: u64| {
            if frames == 0 {
                0.0
            } else {
                (n as f64 / frames as f64 * 10_000.0).round() / 10_000.0
            }
        };

        MetricsSnapshot {
            frames_processed: frames,
            faces_detected: faces,
            detection_errors: errors,
            recognition_matches: self.recognition_matches.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            enrollment_attempts: self.enrollment_attempts.load(Ordering::Relaxed),
            enrollment_success: self.enrollment_success.load(Ordering::Relaxed),
            enrollment_failures: self.enrollment_failures.load(Ordering::Relaxed),
            enrollment_duplicates: self.enrollment_duplicates.load(Ordering::Relaxed),
            enrollment_count: self.enrollment_count.load(Ordering::Relaxed),
            faces_per_frame: ratio(faces),
            error_rate: ratio(errors),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.frames_processed,
            &self.faces_detected,
            &self.detection_errors,
            &self.recognition_matches,
            &self.encode_errors,
            &self.alerts_fired,
            &self.enrollment_attempts,
            &self.enrollment_success,
            &self.enrollment_failures,
            &self.enrollment_duplicates,
            &self.enrollment_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        tracing::info!("all metrics have been reset");
    }
}
