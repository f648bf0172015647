use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use faceroom_core::detector::NullDetector;
use faceroom_core::FaceDetector;
use faceroom_hw::{Camera, V4l2Backend};
use faceroomd::alert::{Alerter, NoopAlerter, SoundAlerter};
use faceroomd::config::Config;
use faceroomd::Faceroom;
use tracing_subscriber::EnvFilter;

const METRICS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceroomd starting");

    let config = Config::from_env();
    tracing::info!(
        camera = config.camera_device,
        db = %config.db_path.display(),
        threshold = config.recognition_threshold,
        cooldown_secs = config.cooldown.as_secs(),
        "configuration loaded"
    );

    for dev in Camera::list_devices() {
        tracing::info!(path = %dev.path, name = %dev.name, driver = %dev.driver, "found capture device");
    }

    let backend = V4l2Backend {
        width: config.capture_width,
        height: config.capture_height,
    };

    tracing::warn!("no face detector backend configured; frames will stream without detections");
    let detector: Arc<dyn FaceDetector> = Arc::new(NullDetector);

    let alerter: Arc<dyn Alerter> = if config.sound_enabled {
        Arc::new(SoundAlerter::new(&config.sounds_dir, config.sound_player.clone()))
    } else {
        Arc::new(NoopAlerter)
    };

    let service = Faceroom::init(&config, backend, detector, alerter)
        .context("failed to initialize faceroom service")?;

    let mut session = service
        .stream(config.camera_device)
        .context("failed to start monitoring session")?;
    tracing::info!(session = %session.id(), device = session.device_id(), "faceroomd ready");

    let mut report = tokio::time::interval(METRICS_INTERVAL);
    report.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            chunk = session.next_chunk() => {
                if chunk.is_none() {
                    tracing::warn!("monitoring session ended");
                    break;
                }
            }
            _ = report.tick() => {
                let m = service.metrics();
                tracing::info!(
                    frames = m.frames_processed,
                    faces = m.faces_detected,
                    matches = m.recognition_matches,
                    alerts = m.alerts_fired,
                    errors = m.detection_errors,
                    error_rate = m.error_rate,
                    enrolled = m.enrollment_count,
                    "pipeline metrics"
                );
            }
            result = &mut shutdown => {
                result.context("failed to listen for shutdown signal")?;
                tracing::info!("faceroomd shutting down");
                break;
            }
        }
    }

    service.shutdown();
    drop(session);

    Ok(())
}
