//! Paced synthetic camera used by the CLI and tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::info;
use vigil_types::{frame::RawFrame, Result, VigilError};

use crate::CaptureDevice;

/// Generates moving-gradient frames at a fixed preview rate.
///
/// Stands in for the wearable's camera HAL wherever real hardware is
/// unavailable.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    opened: AtomicBool,
    counter: AtomicU64,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(100),
            opened: AtomicBool::new(false),
            counter: AtomicU64::new(0),
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCamera {
    async fn open(&self) -> Result<()> {
        info!(
            "Opening synthetic camera {}x{} at {:?} per frame",
            self.width, self.height, self.frame_interval
        );
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn next_frame(&self) -> Result<RawFrame> {
        if !self.opened.load(Ordering::SeqCst) {
            return Err(VigilError::CameraUnavailable(
                "synthetic camera is not open".into(),
            ));
        }
        sleep(self.frame_interval).await;

        let tick = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut frame = RawFrame::black(self.width, self.height);
        for (index, sample) in frame.y.iter_mut().enumerate() {
            *sample = ((index as u64 + tick * 7) % 256) as u8;
        }
        Ok(frame)
    }

    async fn close(&self) -> Result<()> {
        self.opened.store(false, Ordering::SeqCst);
        Ok(())
    }
}
