//! Audible alerting.
//!
//! Alerting must never crash the pipeline: every player failure is logged
//! and swallowed, and playback is scheduled on a timer task so callers are
//! never blocked.

use std::sync::{Arc, Mutex};

use tokio::{
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{info, warn};
use vigil_types::{config::AlertConfig, Result};

/// Tone-generation collaborator (the platform audio resource).
pub trait TonePlayer: Send + Sync {
    fn start_tone(&self, kind: ToneKind, duration: Duration) -> Result<()>;
    fn release(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneKind {
    Alert,
    Beep,
}

/// Alert seam consumed by the orchestrator.
pub trait Alerter: Send + Sync {
    fn play_danger_alert(&self);
    fn play_test_tone(&self);
    fn release(&self);
}

/// Schedules bounded tone patterns on the runtime's timer.
pub struct AlertSink<T: TonePlayer + 'static> {
    player: Arc<T>,
    config: AlertConfig,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: TonePlayer + 'static> AlertSink<T> {
    pub fn new(player: T, config: AlertConfig) -> Self {
        Self {
            player: Arc::new(player),
            config,
            pending: Mutex::new(None),
        }
    }

    fn replace_pending(&self, handle: Option<JoinHandle<()>>) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.take() {
                previous.abort();
            }
            *pending = handle;
        }
    }
}

impl<T: TonePlayer + 'static> Alerter for AlertSink<T> {
    /// Fire-and-forget: exactly `repeats` short tones at a fixed cadence.
    /// A new alert supersedes any sequence still playing.
    fn play_danger_alert(&self) {
        info!("Playing danger alert");
        let player = self.player.clone();
        let tone = Duration::from_millis(self.config.tone_ms);
        let gap = Duration::from_millis(self.config.gap_ms);
        let repeats = self.config.repeats;

        let handle = tokio::spawn(async move {
            for _ in 0..repeats {
                if let Err(err) = player.start_tone(ToneKind::Alert, tone) {
                    warn!("Failed to play alert tone: {err}");
                }
                sleep(tone + gap).await;
            }
        });
        self.replace_pending(Some(handle));
    }

    fn play_test_tone(&self) {
        if let Err(err) = self
            .player
            .start_tone(ToneKind::Beep, Duration::from_millis(200))
        {
            warn!("Failed to play test tone: {err}");
        }
    }

    /// Scoped teardown: cancels any pending tones and releases the player.
    /// Safe to call repeatedly; failures are logged, never propagated.
    fn release(&self) {
        self.replace_pending(None);
        if let Err(err) = self.player.release() {
            warn!("Failed to release tone player: {err}");
        }
    }
}

/// Player that only logs, for hosts without an audio path.
pub struct LogTonePlayer;

impl TonePlayer for LogTonePlayer {
    fn start_tone(&self, kind: ToneKind, duration: Duration) -> Result<()> {
        info!("Tone {kind:?} for {duration:?}");
        Ok(())
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}
