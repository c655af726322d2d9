//! Camera capture abstraction layer.
//!
//! A [`CaptureDevice`] is the hardware collaborator: it delivers raw planar
//! frames at a low preview rate on demand. [`FrameSource`] wraps one device
//! with the single-slot mailbox discipline the pipeline relies on: a
//! capture-request flag consumed atomically by the capture worker, and a
//! frame slot that is overwritten, never queued.

pub mod encoder;

mod synthetic;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tokio::{
    task::JoinHandle,
    time::{sleep, Duration, Instant},
};
use tracing::{error, info, warn};
use vigil_types::{
    config::CaptureConfig,
    frame::{CapturedFrame, RawFrame},
    Result, VigilError,
};

pub use synthetic::SyntheticCamera;

/// Hardware capture collaborator.
///
/// `open` establishes the device and its repeating low-frame-rate preview
/// stream; `next_frame` yields the next preview frame and errors when the
/// device has gone away.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self) -> Result<()>;
    async fn next_frame(&self) -> Result<RawFrame>;
    async fn close(&self) -> Result<()>;
}

/// Frame acquisition seam consumed by the orchestrator.
#[async_trait]
pub trait FrameProvider: Send + Sync {
    async fn open(&self) -> Result<()>;
    fn is_ready(&self) -> bool;
    fn request_frame(&self);
    async fn poll_frame(&self, timeout: Duration) -> Option<CapturedFrame>;
    async fn close(&self);
}

struct Mailbox {
    /// The "photo wanted" flag, consumed with compare-and-clear by the
    /// capture worker. At most one outstanding request is honored.
    want_photo: AtomicBool,
    /// Set once the first preview frame arrives, cleared on device loss.
    ready: AtomicBool,
    closing: AtomicBool,
    /// Single frame slot: publish-overwrite on the worker side, take on
    /// the poll side. Never holds more than one frame.
    slot: Mutex<Option<CapturedFrame>>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            want_photo: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    fn publish(&self, frame: CapturedFrame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
        }
    }

    fn take(&self) -> Option<CapturedFrame> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Capture front-end owning the device worker and the frame mailbox.
pub struct FrameSource<D: CaptureDevice + 'static> {
    device: Arc<D>,
    config: CaptureConfig,
    mailbox: Arc<Mailbox>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: CaptureDevice + 'static> FrameSource<D> {
    pub fn new(device: D, config: CaptureConfig) -> Self {
        Self {
            device: Arc::new(device),
            config,
            mailbox: Arc::new(Mailbox::new()),
            worker: Mutex::new(None),
        }
    }

    fn worker_running(&self) -> bool {
        self.worker
            .lock()
            .map(|guard| guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    fn store_worker(&self, handle: JoinHandle<()>) {
        if let Ok(mut guard) = self.worker.lock() {
            *guard = Some(handle);
        }
    }

    fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().ok().and_then(|mut guard| guard.take())
    }
}

/// Dedicated capture-processing loop: runs device callbacks' work without
/// ever blocking on the analysis side.
async fn capture_worker<D: CaptureDevice>(device: Arc<D>, mailbox: Arc<Mailbox>, quality: u8) {
    loop {
        if mailbox.closing.load(Ordering::SeqCst) {
            break;
        }
        let frame = match device.next_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                error!("Capture device failed: {err}");
                mailbox.ready.store(false, Ordering::SeqCst);
                break;
            }
        };
        mailbox.ready.store(true, Ordering::SeqCst);

        // Frames without an outstanding request are dropped with no side
        // effect; the compare-and-clear guarantees one frame per request.
        if mailbox
            .want_photo
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            match encoder::encode_jpeg(&frame, quality) {
                Ok(jpeg) => {
                    info!("Captured frame ({} bytes)", jpeg.len());
                    mailbox.publish(CapturedFrame::new(jpeg));
                }
                Err(err) => warn!("Frame encode failed, treating as capture miss: {err}"),
            }
        }
    }
    info!("Capture worker stopped");
}

#[async_trait]
impl<D: CaptureDevice + 'static> FrameProvider for FrameSource<D> {
    async fn open(&self) -> Result<()> {
        if self.worker_running() {
            return Ok(());
        }
        self.device
            .open()
            .await
            .map_err(|err| VigilError::CameraUnavailable(err.to_string()))?;
        self.mailbox.closing.store(false, Ordering::SeqCst);

        let device = self.device.clone();
        let mailbox = self.mailbox.clone();
        let quality = self.config.jpeg_quality;
        self.store_worker(tokio::spawn(capture_worker(device, mailbox, quality)));
        info!("Frame source opened");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.mailbox.ready.load(Ordering::SeqCst)
    }

    fn request_frame(&self) {
        if !self.is_ready() {
            warn!("Frame requested while camera not ready; ignoring");
            return;
        }
        // Discard any stale frame so the poll below only ever observes the
        // frame produced for this request.
        self.mailbox.take();
        self.mailbox.want_photo.store(true, Ordering::SeqCst);
    }

    async fn poll_frame(&self, timeout: Duration) -> Option<CapturedFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.mailbox.take() {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    async fn close(&self) {
        self.mailbox.ready.store(false, Ordering::SeqCst);
        if self.mailbox.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.take_worker() {
            handle.abort();
        }
        self.mailbox.want_photo.store(false, Ordering::SeqCst);
        self.mailbox.take();
        if let Err(err) = self.device.close().await {
            warn!("Error closing capture device: {err}");
        }
        info!("Frame source closed");
    }
}
