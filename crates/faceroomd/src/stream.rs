//! Per-viewer MJPEG stream sessions.
//!
//! Each session runs on its own OS thread and hands multipart chunks to the
//! consumer over a bounded tokio channel. A session ends when it is removed
//! from the active set or its receiver is dropped; once no sessions remain
//! every cached camera handle is released.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use faceroom_core::Metrics;
use faceroom_hw::{CameraManager, CaptureBackend};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::mjpeg;
use crate::overlay;
use crate::pipeline::FramePipeline;

pub type SessionId = Uuid;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to spawn stream worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Target time between frames.
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
    /// Downscale factor applied before detection.
    pub detection_scale: f64,
    pub draw_labels: bool,
    /// Chunks buffered per session before the worker blocks.
    pub buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            jpeg_quality: 90,
            detection_scale: 0.5,
            draw_labels: true,
            buffer: 2,
        }
    }
}

/// Consumer end of one stream session.
pub struct StreamSession {
    id: SessionId,
    device_id: u32,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl StreamSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Next multipart chunk, or `None` once the session has ended.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Blocking variant for callers outside the async runtime.
    pub fn blocking_next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.blocking_recv()
    }
}

struct Shared<B: CaptureBackend> {
    pipeline: Arc<FramePipeline<B>>,
    cameras: Arc<CameraManager<B>>,
    metrics: Arc<Metrics>,
    sessions: Mutex<HashSet<SessionId>>,
    config: StreamConfig,
}

pub struct StreamController<B: CaptureBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: CaptureBackend> StreamController<B> {
    pub fn new(
        pipeline: Arc<FramePipeline<B>>,
        cameras: Arc<CameraManager<B>>,
        metrics: Arc<Metrics>,
        config: StreamConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pipeline,
                cameras,
                metrics,
                sessions: Mutex::new(HashSet::new()),
                config,
            }),
        }
    }

    /// Start a new session streaming from `device_id`.
    pub fn start(&self, device_id: u32) -> Result<StreamSession, StreamError> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.shared.config.buffer.max(1));
        self.shared.sessions.lock().insert(id);

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("faceroom-stream-{}", id.simple()))
            .spawn(move || shared.run_session(id, device_id, tx));

        if let Err(e) = spawned {
            tracing::error!(session = %id, error = %e, "failed to spawn stream worker");
            self.shared.end_session(&id);
            return Err(e.into());
        }

        tracing::info!(session = %id, device_id, "stream session started");
        Ok(StreamSession { id, device_id, rx })
    }

    /// Remove a session from the active set. Its worker exits at the next
    /// iteration check. Returns `false` if the session was not active.
    pub fn stop(&self, id: SessionId) -> bool {
        self.shared.end_session(&id)
    }

    pub fn active_sessions(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        self.shared.is_active(&id)
    }

    /// End every session and release all cameras.
    pub fn shutdown(&self) {
        let ended = {
            let mut sessions = self.shared.sessions.lock();
            let ended = sessions.len();
            sessions.clear();
            ended
        };
        let released = self.shared.cameras.release_all();
        tracing::info!(ended, released, "stream controller shut down");
    }
}

impl<B: CaptureBackend> Shared<B> {
    fn is_active(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains(id)
    }

    /// Remove `id`; release cameras if it was the last active session.
    ///
    /// The release runs after the session lock is dropped, since it waits
    /// for any in-flight device read.
    fn end_session(&self, id: &SessionId) -> bool {
        let (removed, now_empty) = {
            let mut sessions = self.sessions.lock();
            let removed = sessions.remove(id);
            (removed, sessions.is_empty())
        };
        if removed && now_empty {
            let released = self.cameras.release_all();
            tracing::info!(session = %id, released, "last stream session ended, cameras released");
        }
        removed
    }

    fn run_session(&self, id: SessionId, device_id: u32, tx: mpsc::Sender<Vec<u8>>) {
        let interval = self.config.frame_interval;

        while self.is_active(&id) {
            let started = Instant::now();

            if let Some(chunk) = self.render(device_id) {
                if !self.deliver(&id, &tx, chunk) {
                    break;
                }
            }

            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }

        if !self.end_session(&id) {
            // Stopped externally. A capture in flight at that moment may have
            // reopened a camera after the release.
            if self.sessions.lock().is_empty() {
                self.cameras.release_all();
            }
        }
        tracing::info!(session = %id, "stream session ended");
    }

    /// Hand `chunk` to the viewer, waiting while its buffer is full.
    /// Returns `false` once the viewer is gone or the session was stopped.
    fn deliver(&self, id: &SessionId, tx: &mpsc::Sender<Vec<u8>>, chunk: Vec<u8>) -> bool {
        let backoff = self.config.frame_interval.max(Duration::from_millis(1));
        let mut chunk = chunk;
        loop {
            match tx.try_send(chunk) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => {
                    tracing::info!(session = %id, "viewer disconnected");
                    return false;
                }
                Err(TrySendError::Full(returned)) => {
                    if !self.is_active(id) {
                        return false;
                    }
                    chunk = returned;
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    /// Produce one multipart chunk: the annotated frame, or a placeholder
    /// naming the failure. `None` if even the placeholder cannot be encoded.
    fn render(&self, device_id: u32) -> Option<Vec<u8>> {
        let cfg = &self.config;
        let image = match self
            .pipeline
            .run(device_id, cfg.detection_scale, cfg.draw_labels)
        {
            Ok(frame) => frame.image,
            Err(e) => overlay::placeholder_frame(e.placeholder_message()),
        };

        match mjpeg::encode_jpeg(&image, cfg.jpeg_quality) {
            Ok(jpeg) => Some(mjpeg::multipart_chunk(&jpeg)),
            Err(e) => {
                self.metrics.encode_error();
                tracing::warn!(device_id, error = %e, "JPEG encoding failed");
                let placeholder = overlay::placeholder_frame("JPEG Encoding Error");
                match mjpeg::encode_jpeg(&placeholder, cfg.jpeg_quality) {
                    Ok(jpeg) => Some(mjpeg::multipart_chunk(&jpeg)),
                    Err(e) => {
                        tracing::error!(device_id, error = %e, "failed to encode error frame, skipping");
                        None
                    }
                }
            }
        }
    }
}
