//! Service facade called by the web layer.
//!
//! Owns every shared component and wires them together in a fixed order
//! at startup. Enrollment failures are surfaced to the caller; streaming
//! never fails once a session has started.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use faceroom_core::enrollment::enrollment_encoding;
use faceroom_core::{
    CooldownTracker, EnrollError, EnrollmentRegistry, EuclideanMatcher, FaceDetector, FaceEncoding,
    MatchOutcome, Matcher, Metrics, MetricsSnapshot, RecognitionThreshold, RegistryError,
    SettingsError,
};
use faceroom_hw::{CameraManager, CaptureBackend};
use image::RgbImage;
use thiserror::Error;

use crate::alert::Alerter;
use crate::config::Config;
use crate::pipeline::FramePipeline;
use crate::stream::{SessionId, StreamConfig, StreamController, StreamError, StreamSession};

#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid setting: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to load enrollment database: {0}")]
    Registry(#[from] RegistryError),
}

impl From<&Config> for StreamConfig {
    fn from(config: &Config) -> Self {
        Self {
            frame_interval: config.frame_interval,
            jpeg_quality: config.jpeg_quality,
            detection_scale: config.detection_scale,
            draw_labels: config.draw_labels,
            ..StreamConfig::default()
        }
    }
}

pub struct Faceroom<B: CaptureBackend> {
    db_path: PathBuf,
    detector: Arc<dyn FaceDetector>,
    registry: Arc<EnrollmentRegistry>,
    threshold: Arc<RecognitionThreshold>,
    cooldowns: Arc<CooldownTracker>,
    metrics: Arc<Metrics>,
    cameras: Arc<CameraManager<B>>,
    streams: StreamController<B>,
    started_at: DateTime<Utc>,
}

impl<B: CaptureBackend> Faceroom<B> {
    /// Build the service: settings, then the enrollment database, then the
    /// camera manager, pipeline and stream controller.
    ///
    /// A missing database file yields an empty registry; an unreadable or
    /// malformed one is an error.
    pub fn init(
        config: &Config,
        backend: B,
        detector: Arc<dyn FaceDetector>,
        alerter: Arc<dyn Alerter>,
    ) -> Result<Self, InitError> {
        let threshold = Arc::new(RecognitionThreshold::new(config.recognition_threshold)?);
        let cooldowns = Arc::new(CooldownTracker::new(config.cooldown)?);
        let metrics = Arc::new(Metrics::new());

        let registry = Arc::new(EnrollmentRegistry::new());
        let report = registry.load(&config.db_path)?;
        metrics.set_enrollment_count(registry.len());
        tracing::info!(
            path = %config.db_path.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            "enrollment database ready"
        );

        let cameras = Arc::new(CameraManager::new(backend));
        let pipeline = Arc::new(FramePipeline::new(
            Arc::clone(&cameras),
            Arc::clone(&detector),
            Arc::clone(&registry),
            Arc::clone(&threshold),
            Arc::clone(&cooldowns),
            alerter,
            Arc::clone(&metrics),
        ));
        let streams = StreamController::new(
            pipeline,
            Arc::clone(&cameras),
            Arc::clone(&metrics),
            StreamConfig::from(config),
        );

        Ok(Self {
            db_path: config.db_path.clone(),
            detector,
            registry,
            threshold,
            cooldowns,
            metrics,
            cameras,
            streams,
            started_at: Utc::now(),
        })
    }

    /// Open a live annotated stream on `device_id`.
    pub fn stream(&self, device_id: u32) -> Result<StreamSession, StreamError> {
        self.streams.start(device_id)
    }

    pub fn stop_stream(&self, id: SessionId) -> bool {
        self.streams.stop(id)
    }

    /// Enroll the first face in `image` under `user_id` and persist.
    ///
    /// If the database cannot be written the record is rolled back.
    pub fn enroll(&self, image: &RgbImage, user_id: &str) -> Result<(), EnrollError> {
        self.metrics.enrollment_attempt();

        let result = enrollment_encoding(self.detector.as_ref(), image, user_id).and_then(
            |encoding| {
                self.registry
                    .enroll_persisted(user_id, encoding, &self.db_path)
                    .map_err(EnrollError::from)
            },
        );

        match &result {
            Ok(()) => {
                self.cooldowns.mark_seen(user_id);
                self.metrics.enrollment_succeeded();
                tracing::info!(user_id, "user enrolled");
            }
            Err(EnrollError::Registry(RegistryError::AlreadyExists(_))) => {
                self.metrics.enrollment_duplicate();
                tracing::warn!(user_id, "user already enrolled");
            }
            Err(e) => {
                self.metrics.enrollment_failed();
                tracing::warn!(user_id, error = %e, "enrollment failed");
            }
        }
        self.metrics.set_enrollment_count(self.registry.len());
        result
    }

    pub fn list_users(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Remove `user_id` and persist. Returns `false` if it was not enrolled.
    pub fn remove_user(&self, user_id: &str) -> bool {
        if !self.registry.remove(user_id) {
            return false;
        }
        if let Err(e) = self.registry.persist(&self.db_path) {
            tracing::error!(user_id, error = %e, "failed to persist after removal");
        }
        self.cooldowns.reset(user_id);
        self.metrics.set_enrollment_count(self.registry.len());
        tracing::info!(user_id, "user removed");
        true
    }

    /// Match one encoding against the enrolled users.
    pub fn identify(&self, encoding: &FaceEncoding) -> MatchOutcome {
        EuclideanMatcher.compare(encoding, &self.registry.snapshot(), self.threshold.get())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold.get()
    }

    pub fn set_threshold(&self, value: f64) -> Result<(), SettingsError> {
        self.threshold.set(value)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldowns.cooldown()
    }

    pub fn set_cooldown(&self, cooldown: Duration) -> Result<(), SettingsError> {
        self.cooldowns.set_cooldown(cooldown)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.metrics.set_enrollment_count(self.registry.len());
    }

    /// Forget every user's last alert so the next sighting alerts again.
    pub fn reset_cooldowns(&self) {
        self.cooldowns.reset_all();
    }

    pub fn active_sessions(&self) -> usize {
        self.streams.active_sessions()
    }

    /// Daemon status as a JSON string.
    pub fn status(&self) -> String {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": self.started_at.to_rfc3339(),
            "active_sessions": self.streams.active_sessions(),
            "enrolled_users": self.registry.len(),
            "recognition_threshold": self.threshold.get(),
            "cooldown_secs": self.cooldowns.cooldown().as_secs_f64(),
            "tracked_users": self.cooldowns.tracked(),
            "cached_cameras": self.cameras.cached_devices(),
        })
        .to_string()
    }

    /// End all sessions and release every camera. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.streams.shutdown();
        tracing::info!("faceroom service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NoopAlerter;
    use crate::testing::{encoding_at, origin, FakeBackend, ScriptedDetector};
    use faceroom_core::FaceBox;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            camera_device: 0,
            capture_width: 640,
            capture_height: 480,
            db_path: dir.join("enrolled_faces.json"),
            recognition_threshold: 0.6,
            cooldown: Duration::from_secs(30),
            frame_interval: Duration::from_millis(5),
            jpeg_quality: 80,
            detection_scale: 0.5,
            draw_labels: true,
            sounds_dir: dir.join("sounds"),
            sound_player: "true".into(),
            sound_enabled: false,
        }
    }

    fn service(dir: &std::path::Path, detector: ScriptedDetector) -> Faceroom<FakeBackend> {
        Faceroom::init(
            &config(dir),
            FakeBackend::default(),
            Arc::new(detector),
            Arc::new(NoopAlerter),
        )
        .unwrap()
    }

    fn centred_face() -> ScriptedDetector {
        ScriptedDetector::with(vec![FaceBox::new(140, 420, 340, 220)], vec![origin()])
    }

    #[test]
    fn test_enroll_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), centred_face());
        let img = RgbImage::new(640, 480);

        svc.enroll(&img, "alice").unwrap();
        assert_eq!(svc.list_users(), vec!["alice".to_string()]);
        assert!(dir.path().join("enrolled_faces.json").exists());

        let reloaded = service(dir.path(), ScriptedDetector::default());
        assert_eq!(reloaded.list_users(), vec!["alice".to_string()]);
        assert_eq!(reloaded.metrics().enrollment_count, 1);
        assert!(reloaded.identify(&encoding_at(0.2)).is_match());
    }

    #[test]
    fn test_enroll_failures_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), centred_face());
        let img = RgbImage::new(640, 480);

        svc.enroll(&img, "alice").unwrap();
        let dup = svc.enroll(&img, "alice").unwrap_err();
        assert!(matches!(dup, EnrollError::Registry(RegistryError::AlreadyExists(_))));
        assert!(svc.enroll(&img, "").is_err());

        let m = svc.metrics();
        assert_eq!(m.enrollment_attempts, 3);
        assert_eq!(m.enrollment_success, 1);
        assert_eq!(m.enrollment_duplicates, 1);
        assert_eq!(m.enrollment_failures, 1);
        assert_eq!(m.enrollment_count, 1);
    }

    #[test]
    fn test_enroll_rolled_back_when_database_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let mut cfg = config(dir.path());
        cfg.db_path = blocker.join("enrolled_faces.json");
        let svc = Faceroom::init(
            &cfg,
            FakeBackend::default(),
            Arc::new(centred_face()),
            Arc::new(NoopAlerter),
        )
        .unwrap();

        let err = svc.enroll(&RgbImage::new(640, 480), "alice").unwrap_err();
        assert!(matches!(err, EnrollError::Registry(RegistryError::Io(_))));
        assert!(svc.list_users().is_empty());
        assert_eq!(svc.metrics().enrollment_failures, 1);
        assert_eq!(svc.metrics().enrollment_count, 0);
    }

    #[test]
    fn test_no_face_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), ScriptedDetector::default());
        let err = svc.enroll(&RgbImage::new(640, 480), "bob").unwrap_err();
        assert!(matches!(err, EnrollError::NoFace));
        assert!(svc.list_users().is_empty());
    }

    #[test]
    fn test_remove_user() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), centred_face());
        svc.enroll(&RgbImage::new(640, 480), "alice").unwrap();

        assert!(svc.remove_user("alice"));
        assert!(!svc.remove_user("alice"));
        assert!(svc.list_users().is_empty());
        assert_eq!(svc.metrics().enrollment_count, 0);
        svc.reset_cooldowns();

        let reloaded = service(dir.path(), ScriptedDetector::default());
        assert!(reloaded.list_users().is_empty());
    }

    #[test]
    fn test_malformed_database_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("enrolled_faces.json"), b"{not json").unwrap();
        let result = Faceroom::init(
            &config(dir.path()),
            FakeBackend::default(),
            Arc::new(ScriptedDetector::default()),
            Arc::new(NoopAlerter),
        );
        assert!(matches!(result, Err(InitError::Registry(_))));
    }

    #[test]
    fn test_settings_validation() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), ScriptedDetector::default());

        assert!(svc.set_threshold(0.5).is_ok());
        assert!(svc.set_threshold(2.0).is_err());
        assert_eq!(svc.threshold(), 0.5);

        assert!(svc.set_cooldown(Duration::ZERO).is_err());
        assert_eq!(svc.cooldown(), Duration::from_secs(30));
        svc.set_cooldown(Duration::from_secs(5)).unwrap();
        assert_eq!(svc.cooldown(), Duration::from_secs(5));
    }

    #[test]
    fn test_status_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), ScriptedDetector::default());
        let mut session = svc.stream(0).unwrap();
        session.blocking_next_chunk().unwrap();

        let status: serde_json::Value = serde_json::from_str(&svc.status()).unwrap();
        assert_eq!(status["active_sessions"], 1);
        assert_eq!(status["enrolled_users"], 0);
        assert_eq!(status["cached_cameras"], serde_json::json!([0]));

        svc.shutdown();
        svc.shutdown();
        assert_eq!(svc.active_sessions(), 0);
    }
}
