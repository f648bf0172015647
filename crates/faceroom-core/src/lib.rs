//! faceroom-core — Enrollment registry, face matching and alert cooldowns.
//!
//! Holds everything on the recognition path that does not touch hardware:
//! the enrolled-face store, the nearest-neighbour matcher, the pluggable
//! detector interface, and the per-user alert rate limiter.

pub mod cooldown;
pub mod detector;
pub mod enrollment;
pub mod matcher;
pub mod metrics;
pub mod registry;
pub mod settings;
pub mod types;

pub use cooldown::CooldownTracker;
pub use detector::{DetectError, Detections, FaceDetector};
pub use enrollment::EnrollError;
pub use matcher::{EuclideanMatcher, Matcher};
pub use metrics::{Metrics, MetricsSnapshot};
pub use registry::{EnrollmentRegistry, RegistryError};
pub use settings::{RecognitionThreshold, SettingsError};
pub use types::{EnrollmentRecord, FaceBox, FaceEncoding, MatchOutcome, ENCODING_DIM};
