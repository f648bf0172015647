//! Per-user alert rate limiting.
//!
//! Every sighting refreshes the user's timestamp, including sightings that
//! do not fire. A user who stays in view keeps pushing the next alert out;
//! an alert fires again only after `cooldown` without being seen.

use crate::settings::SettingsError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

struct Inner {
    last_seen: HashMap<String, Instant>,
    cooldown: Duration,
}

pub struct CooldownTracker {
    inner: Mutex<Inner>,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Result<Self, SettingsError> {
        if cooldown.is_zero() {
            return Err(SettingsError::ZeroCooldown);
        }
        Ok(Self {
            inner: Mutex::new(Inner { last_seen: HashMap::new(), cooldown }),
        })
    }

    /// Record a sighting. Returns true if the caller should fire the alert.
    pub fn notify(&self, user_id: &str) -> bool {
        self.notify_at(user_id, Instant::now())
    }

    /// [`notify`](Self::notify) with an explicit clock reading.
    pub fn notify_at(&self, user_id: &str, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        let cooldown = inner.cooldown;
        let fired = match inner.last_seen.get(user_id) {
            Some(&last) => now.saturating_duration_since(last) >= cooldown,
            None => true,
        };
        inner.last_seen.insert(user_id.to_string(), now);
        fired
    }

    /// Refresh the timestamp without ever firing.
    pub fn mark_seen(&self, user_id: &str) {
        self.mark_seen_at(user_id, Instant::now());
    }

    pub fn mark_seen_at(&self, user_id: &str, now: Instant) {
        self.inner.lock().last_seen.insert(user_id.to_string(), now);
    }

    /// Forget the user; the next `notify` fires.
    pub fn reset(&self, user_id: &str) {
        if self.inner.lock().last_seen.remove(user_id).is_some() {
            tracing::debug!(user_id, "reset alert cooldown");
        }
    }

    pub fn reset_all(&self) {
        self.inner.lock().last_seen.clear();
        tracing::debug!("reset all alert cooldowns");
    }

    pub fn cooldown(&self) -> Duration {
        self.inner.lock().cooldown
    }

    /// Change the cooldown. Zero is rejected and the previous value kept.
    pub fn set_cooldown(&self, cooldown: Duration) -> Result<(), SettingsError> {
        if cooldown.is_zero() {
            tracing::warn!(current = ?self.cooldown(), "rejected zero cooldown");
            return Err(SettingsError::ZeroCooldown);
        }
        let previous = std::mem::replace(&mut self.inner.lock().cooldown, cooldown);
        tracing::info!(?previous, ?cooldown, "alert cooldown updated");
        Ok(())
    }

    /// Number of users currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().last_seen.len()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner { last_seen: HashMap::new(), cooldown: DEFAULT_COOLDOWN }),
        }
    }
}
