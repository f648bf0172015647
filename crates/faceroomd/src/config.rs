use std::path::PathBuf;
use std::time::Duration;

use faceroom_core::cooldown::DEFAULT_COOLDOWN;
use faceroom_core::settings::{DEFAULT_THRESHOLD, MAX_THRESHOLD, MIN_THRESHOLD};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Camera device id (`/dev/video{N}`).
    pub camera_device: u32,
    /// Requested capture resolution.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Path to the JSON enrollment database.
    pub db_path: PathBuf,
    /// Maximum encoding distance for a positive match.
    pub recognition_threshold: f64,
    /// Minimum quiet period before the same user triggers another alert.
    pub cooldown: Duration,
    /// Target time between streamed frames.
    pub frame_interval: Duration,
    /// JPEG quality for streamed frames (1–100).
    pub jpeg_quality: u8,
    /// Downscale factor applied before detection, in (0, 1].
    pub detection_scale: f64,
    /// Label faces with the matched user id instead of a bare box.
    pub draw_labels: bool,
    /// Directory holding `<user_id>.mp3` alert sounds and `default.mp3`.
    pub sounds_dir: PathBuf,
    /// External command used to play alert sounds.
    pub sound_player: String,
    pub sound_enabled: bool,
}

impl Config {
    /// Load configuration from `FACEROOM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("faceroom");

        let db_path = std::env::var("FACEROOM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("enrolled_faces.json"));

        let sounds_dir = std::env::var("FACEROOM_SOUNDS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("sounds"));

        let recognition_threshold = env_f64("FACEROOM_RECOGNITION_THRESHOLD", DEFAULT_THRESHOLD);
        let recognition_threshold =
            if (MIN_THRESHOLD..=MAX_THRESHOLD).contains(&recognition_threshold) {
                recognition_threshold
            } else {
                tracing::warn!(
                    value = recognition_threshold,
                    default = DEFAULT_THRESHOLD,
                    "FACEROOM_RECOGNITION_THRESHOLD out of range, using default"
                );
                DEFAULT_THRESHOLD
            };

        let cooldown_secs = env_u64("FACEROOM_COOLDOWN_SECS", DEFAULT_COOLDOWN.as_secs());
        let cooldown = if cooldown_secs == 0 {
            tracing::warn!("FACEROOM_COOLDOWN_SECS must be > 0, using default");
            DEFAULT_COOLDOWN
        } else {
            Duration::from_secs(cooldown_secs)
        };

        let detection_scale = env_f64("FACEROOM_DETECTION_SCALE", 0.5);
        let detection_scale = if detection_scale > 0.0 && detection_scale <= 1.0 {
            detection_scale
        } else {
            tracing::warn!(value = detection_scale, "FACEROOM_DETECTION_SCALE must be in (0, 1], using 0.5");
            0.5
        };

        Self {
            camera_device: env_u32("FACEROOM_CAMERA_DEVICE", 0),
            capture_width: env_u32("FACEROOM_CAPTURE_WIDTH", 640),
            capture_height: env_u32("FACEROOM_CAPTURE_HEIGHT", 480),
            db_path,
            recognition_threshold,
            cooldown,
            frame_interval: Duration::from_millis(env_u64("FACEROOM_FRAME_INTERVAL_MS", 33)),
            jpeg_quality: env_u64("FACEROOM_JPEG_QUALITY", 90).clamp(1, 100) as u8,
            detection_scale,
            draw_labels: env_flag("FACEROOM_DRAW_LABELS", true),
            sounds_dir,
            sound_player: std::env::var("FACEROOM_SOUND_PLAYER")
                .unwrap_or_else(|_| "paplay".to_string()),
            sound_enabled: env_flag("FACEROOM_SOUND_ENABLED", true),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
