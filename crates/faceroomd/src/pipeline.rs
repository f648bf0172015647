//! One capture → detect → match → annotate pass.
//!
//! Detection runs on a downscaled copy of the frame; boxes are mapped back to
//! full resolution before drawing. Every failure is counted in [`Metrics`]
//! and reported as an error value, never a panic.

use std::borrow::Cow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use faceroom_core::{
    CooldownTracker, DetectError, EnrollmentRegistry, EuclideanMatcher, FaceBox, FaceDetector,
    MatchOutcome, Matcher, Metrics, RecognitionThreshold,
};
use faceroom_hw::{CameraError, CameraManager, CaptureBackend};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

use crate::alert::Alerter;
use crate::overlay::{self, Marker};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("downscale factor must be in (0, 1], got {0}")]
    InvalidScale(f64),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detection failed: {0}")]
    Detection(#[from] DetectError),
    #[error("face detector panicked")]
    DetectorPanicked,
}

impl PipelineError {
    /// Message rendered on the placeholder frame sent in place of this frame.
    pub fn placeholder_message(&self) -> &'static str {
        match self {
            PipelineError::Camera(_) => "Camera Unavailable",
            PipelineError::Detection(_) | PipelineError::InvalidScale(_) => "Frame Error",
            PipelineError::DetectorPanicked => "Internal Error",
        }
    }
}

/// One face found in a processed frame, in full-resolution coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedFace {
    pub face_box: FaceBox,
    /// `None` when labelling is off.
    pub outcome: Option<MatchOutcome>,
}

pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub faces: Vec<RecognizedFace>,
    pub sequence: u32,
}

pub struct FramePipeline<B: CaptureBackend> {
    cameras: Arc<CameraManager<B>>,
    detector: Arc<dyn FaceDetector>,
    registry: Arc<EnrollmentRegistry>,
    threshold: Arc<RecognitionThreshold>,
    cooldowns: Arc<CooldownTracker>,
    alerter: Arc<dyn Alerter>,
    metrics: Arc<Metrics>,
    matcher: EuclideanMatcher,
}

impl<B: CaptureBackend> FramePipeline<B> {
    pub fn new(
        cameras: Arc<CameraManager<B>>,
        detector: Arc<dyn FaceDetector>,
        registry: Arc<EnrollmentRegistry>,
        threshold: Arc<RecognitionThreshold>,
        cooldowns: Arc<CooldownTracker>,
        alerter: Arc<dyn Alerter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cameras,
            detector,
            registry,
            threshold,
            cooldowns,
            alerter,
            metrics,
            matcher: EuclideanMatcher,
        }
    }

    /// Capture and annotate one frame, or `None` if any step failed.
    pub fn process(
        &self,
        device_id: u32,
        downscale: f64,
        draw_labels: bool,
    ) -> Option<AnnotatedFrame> {
        self.run(device_id, downscale, draw_labels).ok()
    }

    /// Like [`process`](Self::process) but keeps the failure reason.
    pub fn run(
        &self,
        device_id: u32,
        downscale: f64,
        draw_labels: bool,
    ) -> Result<AnnotatedFrame, PipelineError> {
        let result = self.try_run(device_id, downscale, draw_labels);
        if let Err(e) = &result {
            self.metrics.detection_error();
            tracing::warn!(device_id, error = %e, "frame processing failed");
        }
        result
    }

    fn try_run(
        &self,
        device_id: u32,
        downscale: f64,
        draw_labels: bool,
    ) -> Result<AnnotatedFrame, PipelineError> {
        if !(downscale > 0.0 && downscale <= 1.0) {
            return Err(PipelineError::InvalidScale(downscale));
        }

        let frame = self.cameras.capture(device_id)?;
        self.metrics.frame_processed();
        let (width, height) = frame.image.dimensions();
        tracing::debug!(
            device_id,
            sequence = frame.sequence,
            brightness = frame.avg_brightness(),
            "frame captured"
        );

        let small: Cow<'_, RgbImage> = if downscale < 1.0 {
            let w = ((width as f64 * downscale) as u32).max(1);
            let h = ((height as f64 * downscale) as u32).max(1);
            Cow::Owned(imageops::resize(&frame.image, w, h, FilterType::Triangle))
        } else {
            Cow::Borrowed(&frame.image)
        };

        let detections = catch_unwind(AssertUnwindSafe(|| self.detector.detect(&small)))
            .map_err(|_| PipelineError::DetectorPanicked)??;
        self.metrics.faces_detected(detections.boxes.len());

        let gallery = if draw_labels && !detections.is_empty() {
            self.registry.snapshot()
        } else {
            Vec::new()
        };
        let threshold = self.threshold.get();

        let mut faces = Vec::with_capacity(detections.boxes.len());
        for (i, raw) in detections.boxes.iter().enumerate() {
            let Some(face_box) = raw.rescale(downscale, width, height) else {
                tracing::debug!(?raw, "dropping degenerate face box");
                continue;
            };

            let outcome = draw_labels.then(|| match detections.encodings.get(i) {
                Some(encoding) => self.matcher.compare(encoding, &gallery, threshold),
                None => MatchOutcome::Unknown,
            });

            if let Some(o) = &outcome {
                tracing::debug!(label = o.label(), ?face_box, "face classified");
            }
            if let Some(MatchOutcome::Matched { user_id, .. }) = &outcome {
                self.metrics.recognition_match();
                if self.cooldowns.notify(user_id) {
                    self.metrics.alert_fired();
                    self.alerter.alert(user_id);
                }
            }

            faces.push(RecognizedFace { face_box, outcome });
        }

        let markers: Vec<(FaceBox, Marker)> = faces
            .iter()
            .map(|f| {
                let marker = match &f.outcome {
                    None => Marker::Plain,
                    Some(MatchOutcome::Matched { user_id, .. }) => Marker::Known(user_id.clone()),
                    Some(MatchOutcome::Unknown) => Marker::Unknown,
                };
                (f.face_box, marker)
            })
            .collect();

        Ok(AnnotatedFrame {
            image: overlay::annotate(&frame.image, &markers),
            faces,
            sequence: frame.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encoding_at, origin, FakeBackend, ScriptedDetector};
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingAlerter {
        alerts: Mutex<Vec<String>>,
    }

    impl Alerter for RecordingAlerter {
        fn alert(&self, user_id: &str) {
            self.alerts.lock().push(user_id.to_string());
        }
    }

    struct Fixture {
        backend: FakeBackend,
        detector: Arc<ScriptedDetector>,
        registry: Arc<EnrollmentRegistry>,
        alerter: Arc<RecordingAlerter>,
        metrics: Arc<Metrics>,
        pipeline: FramePipeline<FakeBackend>,
    }

    fn fixture(detector: ScriptedDetector) -> Fixture {
        let backend = FakeBackend::default();
        let detector = Arc::new(detector);
        let registry = Arc::new(EnrollmentRegistry::new());
        let alerter = Arc::new(RecordingAlerter::default());
        let metrics = Arc::new(Metrics::new());
        let pipeline = FramePipeline::new(
            Arc::new(CameraManager::new(backend.clone())),
            detector.clone(),
            registry.clone(),
            Arc::new(RecognitionThreshold::default()),
            Arc::new(CooldownTracker::new(Duration::from_secs(30)).unwrap()),
            alerter.clone(),
            metrics.clone(),
        );
        Fixture {
            backend,
            detector,
            registry,
            alerter,
            metrics,
            pipeline,
        }
    }

    #[test]
    fn test_boxes_rescaled_to_full_resolution() {
        let f = fixture(ScriptedDetector::with(
            vec![FaceBox::new(10, 60, 70, 20)],
            vec![origin()],
        ));
        let frame = f.pipeline.process(0, 0.5, false).unwrap();

        assert_eq!(f.detector.seen_sizes.lock().as_slice(), &[(320, 240)]);
        assert_eq!(frame.image.dimensions(), (640, 480));
        assert_eq!(frame.faces.len(), 1);
        assert_eq!(frame.faces[0].face_box, FaceBox::new(20, 120, 140, 40));
        assert_eq!(frame.faces[0].outcome, None);
    }

    #[test]
    fn test_full_scale_skips_resize() {
        let f = fixture(ScriptedDetector::default());
        let frame = f.pipeline.process(0, 1.0, true).unwrap();
        assert!(frame.faces.is_empty());
        assert_eq!(f.detector.seen_sizes.lock().as_slice(), &[(640, 480)]);
    }

    #[test]
    fn test_labels_known_and_unknown_faces() {
        let f = fixture(ScriptedDetector::with(
            vec![FaceBox::new(10, 60, 70, 20), FaceBox::new(100, 200, 200, 100)],
            vec![encoding_at(0.1), encoding_at(5.0)],
        ));
        f.registry.enroll("alice", origin()).unwrap();

        let frame = f.pipeline.process(0, 1.0, true).unwrap();
        assert_eq!(frame.faces[0].outcome.as_ref().and_then(|o| o.user_id()), Some("alice"));
        assert_eq!(frame.faces[1].outcome, Some(MatchOutcome::Unknown));
        assert_eq!(f.alerter.alerts.lock().as_slice(), &["alice".to_string()]);

        let snap = f.metrics.snapshot();
        assert_eq!(snap.frames_processed, 1);
        assert_eq!(snap.faces_detected, 2);
        assert_eq!(snap.recognition_matches, 1);
        assert_eq!(snap.alerts_fired, 1);
    }

    #[test]
    fn test_cooldown_suppresses_repeat_alerts() {
        let f = fixture(ScriptedDetector::with(
            vec![FaceBox::new(10, 60, 70, 20)],
            vec![origin()],
        ));
        f.registry.enroll("alice", origin()).unwrap();

        for _ in 0..3 {
            f.pipeline.process(0, 1.0, true).unwrap();
        }
        assert_eq!(f.alerter.alerts.lock().len(), 1);
        assert_eq!(f.metrics.snapshot().recognition_matches, 3);
    }

    #[test]
    fn test_missing_encoding_is_unknown() {
        let f = fixture(ScriptedDetector::with(vec![FaceBox::new(10, 60, 70, 20)], vec![]));
        f.registry.enroll("alice", origin()).unwrap();
        let frame = f.pipeline.process(0, 1.0, true).unwrap();
        assert_eq!(frame.faces[0].outcome, Some(MatchOutcome::Unknown));
        assert!(f.alerter.alerts.lock().is_empty());
    }

    #[test]
    fn test_camera_failure_returns_none() {
        let f = fixture(ScriptedDetector::default());
        f.backend.state.fail_open.store(true, Ordering::SeqCst);

        assert!(f.pipeline.process(0, 0.5, true).is_none());
        let err = f.pipeline.run(0, 0.5, true).err().unwrap();
        assert_eq!(err.placeholder_message(), "Camera Unavailable");
        assert_eq!(f.metrics.snapshot().detection_errors, 2);
        assert_eq!(f.metrics.snapshot().frames_processed, 0);
    }

    #[test]
    fn test_detector_panic_is_contained() {
        let f = fixture(ScriptedDetector::default());
        f.detector.panic.store(true, Ordering::SeqCst);
        let err = f.pipeline.run(0, 1.0, false).err().unwrap();
        assert!(matches!(err, PipelineError::DetectorPanicked));
        assert_eq!(err.placeholder_message(), "Internal Error");
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let f = fixture(ScriptedDetector::default());
        assert!(f.pipeline.process(0, 0.0, false).is_none());
        assert!(f.pipeline.process(0, 1.5, false).is_none());
        assert_eq!(f.backend.state.opens.load(Ordering::SeqCst), 0);
    }
}
