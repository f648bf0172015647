//! Sound alerts for recognised users.
//!
//! Dispatch never blocks the caller: path resolution is cheap and playback
//! runs on a detached thread.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const DEFAULT_SOUND_FILE: &str = "default.mp3";

/// Side effect fired when a recognised user passes the cooldown gate.
pub trait Alerter: Send + Sync {
    fn alert(&self, user_id: &str);
}

/// Alerter that does nothing (sounds disabled).
pub struct NoopAlerter;

impl Alerter for NoopAlerter {
    fn alert(&self, user_id: &str) {
        tracing::debug!(user_id, "alert suppressed (sounds disabled)");
    }
}

/// Plays `<sounds_dir>/<user_id>.mp3` (or `default.mp3`) with an external player.
pub struct SoundAlerter {
    sounds_dir: PathBuf,
    player: String,
}

impl SoundAlerter {
    pub fn new(sounds_dir: impl Into<PathBuf>, player: impl Into<String>) -> Self {
        Self {
            sounds_dir: sounds_dir.into(),
            player: player.into(),
        }
    }

    /// Exact filename, then a case-insensitive match, then the default sound.
    pub fn resolve(&self, user_id: &str) -> Option<PathBuf> {
        resolve_sound(&self.sounds_dir, user_id)
    }
}

impl Alerter for SoundAlerter {
    fn alert(&self, user_id: &str) {
        let Some(path) = self.resolve(user_id) else {
            tracing::warn!(user_id, dir = %self.sounds_dir.display(), "no sound file for user");
            return;
        };

        let player = self.player.clone();
        let user = user_id.to_string();
        let spawned = std::thread::Builder::new()
            .name("faceroom-sound".into())
            .spawn(move || {
                let status = Command::new(&player)
                    .arg(&path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                match status {
                    Ok(s) if s.success() => {
                        tracing::debug!(user_id = %user, sound = %path.display(), "sound played")
                    }
                    Ok(s) => tracing::warn!(user_id = %user, %player, status = %s, "sound player failed"),
                    Err(e) => tracing::warn!(user_id = %user, %player, error = %e, "failed to run sound player"),
                }
            });

        match spawned {
            Ok(_) => tracing::info!(user_id, "playing sound for user"),
            Err(e) => tracing::warn!(user_id, error = %e, "failed to spawn sound thread"),
        }
    }
}

/// A user id usable as a file stem: non-empty, no separators, not `.`/`..`.
fn is_plain_name(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id != "."
        && user_id != ".."
        && !user_id.contains(['/', '\\', '\0'])
}

fn resolve_sound(dir: &Path, user_id: &str) -> Option<PathBuf> {
    let default = dir.join(DEFAULT_SOUND_FILE);
    if !is_plain_name(user_id) {
        tracing::warn!(user_id, "user id is not a plain file name, using default sound");
        return default.is_file().then_some(default);
    }

    let wanted = format!("{user_id}.mp3");
    let exact = dir.join(&wanted);
    if exact.is_file() {
        return Some(exact);
    }

    if let Ok(entries) = std::fs::read_dir(dir) {
        let wanted_lower = wanted.to_lowercase();
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().to_lowercase() == wanted_lower {
                return Some(entry.path());
            }
        }
    }

    default.is_file().then_some(default)
}
