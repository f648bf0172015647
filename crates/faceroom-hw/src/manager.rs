//! Camera resource manager: cached, lockable capture handles per device id.
//!
//! Each device id owns a slot guarded by its own mutex. Opening, replacing
//! and releasing a device happen under that mutex, so there is never more
//! than one live device per id. Reads lock only the device itself.
//!
//! A failed read closes the device and evicts it from the cache; the next
//! `acquire` reopens it. The manager never retries on its own.

use crate::camera::CameraError;
use crate::device::{CaptureBackend, CaptureDevice};
use crate::frame::Frame;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct OpenDevice<D> {
    /// `None` once closed.
    device: Mutex<Option<D>>,
    generation: u64,
}

impl<D: CaptureDevice> OpenDevice<D> {
    fn is_healthy(&self) -> bool {
        match self.device.try_lock() {
            Some(device) => device.as_ref().is_some_and(|d| d.is_healthy()),
            // A read is in progress; it will evict the device itself if it fails.
            None => true,
        }
    }

    /// Drop the underlying device. Waits for an in-flight read to finish.
    fn close(&self) -> bool {
        self.device.lock().take().is_some()
    }
}

struct Slot<D> {
    current: Mutex<Option<Arc<OpenDevice<D>>>>,
}

/// Shared handle to an open camera.
pub struct CameraHandle<D> {
    device_id: u32,
    inner: Arc<OpenDevice<D>>,
}

impl<D> Clone for CameraHandle<D> {
    fn clone(&self) -> Self {
        Self {
            device_id: self.device_id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> CameraHandle<D> {
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Increments every time the manager opens a device.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }
}

pub struct CameraManager<B: CaptureBackend> {
    backend: B,
    slots: Mutex<HashMap<u32, Arc<Slot<B::Device>>>>,
    opens: AtomicU64,
}

impl<B: CaptureBackend> CameraManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slots: Mutex::new(HashMap::new()),
            opens: AtomicU64::new(0),
        }
    }

    fn slot(&self, device_id: u32) -> Arc<Slot<B::Device>> {
        Arc::clone(
            self.slots
                .lock()
                .entry(device_id)
                .or_insert_with(|| Arc::new(Slot { current: Mutex::new(None) })),
        )
    }

    fn existing_slot(&self, device_id: u32) -> Option<Arc<Slot<B::Device>>> {
        self.slots.lock().get(&device_id).cloned()
    }

    /// Return the cached handle for `device_id`, opening the device if the
    /// cache is empty or holds an unhealthy handle.
    ///
    /// On open failure nothing is cached.
    pub fn acquire(&self, device_id: u32) -> Result<CameraHandle<B::Device>, CameraError> {
        let slot = self.slot(device_id);
        let mut current = slot.current.lock();

        if let Some(open) = current.as_ref() {
            if open.is_healthy() {
                return Ok(CameraHandle {
                    device_id,
                    inner: Arc::clone(open),
                });
            }
        }

        if let Some(stale) = current.take() {
            tracing::debug!(device_id, generation = stale.generation, "releasing stale camera handle");
            stale.close();
        }

        let device = self.backend.open(device_id).map_err(|e| {
            tracing::warn!(device_id, error = %e, "camera unavailable");
            e
        })?;

        let generation = self.opens.fetch_add(1, Ordering::Relaxed) + 1;
        let open = Arc::new(OpenDevice {
            device: Mutex::new(Some(device)),
            generation,
        });
        *current = Some(Arc::clone(&open));
        tracing::info!(device_id, generation, "camera handle opened");

        Ok(CameraHandle {
            device_id,
            inner: open,
        })
    }

    /// Read one frame. A failure invalidates the handle and evicts it.
    pub fn read(&self, handle: &CameraHandle<B::Device>) -> Result<Frame, CameraError> {
        let result = {
            let mut device = handle.inner.device.lock();
            match device.as_mut() {
                Some(d) => d.read(),
                None => Err(CameraError::Released(handle.device_id)),
            }
        };

        if let Err(e) = &result {
            tracing::warn!(device_id = handle.device_id, error = %e, "camera read failed, evicting handle");
            self.evict(handle);
        }
        result
    }

    /// Acquire and read in one call.
    pub fn capture(&self, device_id: u32) -> Result<Frame, CameraError> {
        let handle = self.acquire(device_id)?;
        self.read(&handle)
    }

    fn evict(&self, handle: &CameraHandle<B::Device>) {
        let Some(slot) = self.existing_slot(handle.device_id) else {
            handle.inner.close();
            return;
        };
        // Close while holding the slot so a concurrent acquire cannot open
        // a second device before this one is gone.
        let mut current = slot.current.lock();
        if current.as_ref().is_some_and(|open| Arc::ptr_eq(open, &handle.inner)) {
            current.take();
        }
        handle.inner.close();
    }

    /// Close and forget the handle for one device.
    pub fn release(&self, device_id: u32) -> bool {
        let Some(slot) = self.existing_slot(device_id) else {
            return false;
        };
        let mut current = slot.current.lock();
        match current.take() {
            Some(open) => {
                open.close();
                tracing::info!(device_id, "camera released");
                true
            }
            None => false,
        }
    }

    /// Close every cached handle. Idempotent.
    ///
    /// Reads already in progress finish first; reads that start afterwards
    /// on an old handle fail with [`CameraError::Released`].
    pub fn release_all(&self) -> usize {
        let slots: Vec<(u32, Arc<Slot<B::Device>>)> = self
            .slots
            .lock()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut released = 0;
        for (device_id, slot) in slots {
            let mut current = slot.current.lock();
            if let Some(open) = current.take() {
                open.close();
                tracing::debug!(device_id, "camera released");
                released += 1;
            }
        }
        if released > 0 {
            tracing::info!(released, "released all cameras");
        }
        released
    }

    pub fn is_cached(&self, device_id: u32) -> bool {
        self.existing_slot(device_id)
            .is_some_and(|slot| slot.current.lock().is_some())
    }

    /// Device ids that currently hold an open handle.
    pub fn cached_devices(&self) -> Vec<u32> {
        let slots: Vec<(u32, Arc<Slot<B::Device>>)> = self
            .slots
            .lock()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();
        let mut ids: Vec<u32> = slots
            .into_iter()
            .filter(|(_, slot)| slot.current.lock().is_some())
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Total number of device opens since creation.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }
}
