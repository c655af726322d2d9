//! Operational helpers: logging setup and the configuration collaborator.

use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};
use vigil_types::{
    config::{OpsConfig, PipelineConfig, DEFAULT_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS},
    Result, VigilError,
};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| VigilError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| VigilError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Persistent-configuration collaborator.
///
/// The orchestrator takes a snapshot at start; it never reads the store
/// mid-loop, so key or interval changes apply on the next run.
pub trait ConfigStore: Send + Sync {
    fn api_key(&self) -> Option<String>;
    fn set_api_key(&self, key: &str);
    fn interval(&self) -> u64;
    fn set_interval(&self, seconds: u64);
    fn enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);

    fn is_configured(&self) -> bool {
        self.api_key()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            api_key: self.api_key().unwrap_or_default(),
            interval_seconds: self.interval(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StoredConfig {
    api_key: Option<String>,
    interval_seconds: Option<u64>,
    enabled: bool,
}

/// In-process store for early development and tests; durable backends are
/// host concerns.
#[derive(Default)]
pub struct MemoryConfigStore {
    inner: Mutex<StoredConfig>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(key: &str) -> Self {
        let store = Self::new();
        store.set_api_key(key);
        store
    }
}

impl ConfigStore for MemoryConfigStore {
    fn api_key(&self) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|cfg| cfg.api_key.clone())
    }

    fn set_api_key(&self, key: &str) {
        if let Ok(mut cfg) = self.inner.lock() {
            cfg.api_key = Some(key.to_string());
        }
    }

    fn interval(&self) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|cfg| cfg.interval_seconds)
            .unwrap_or(DEFAULT_INTERVAL_SECONDS)
    }

    fn set_interval(&self, seconds: u64) {
        if let Ok(mut cfg) = self.inner.lock() {
            cfg.interval_seconds = Some(seconds.max(MIN_INTERVAL_SECONDS));
        }
    }

    fn enabled(&self) -> bool {
        self.inner.lock().map(|cfg| cfg.enabled).unwrap_or(false)
    }

    fn set_enabled(&self, enabled: bool) {
        if let Ok(mut cfg) = self.inner.lock() {
            cfg.enabled = enabled;
        }
    }
}
