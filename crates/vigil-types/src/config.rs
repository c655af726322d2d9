use std::{fs, net::IpAddr, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Result, VigilError};

/// Snapshot handed to the orchestrator at loop start.
///
/// Changes to the key or interval while a loop is running take effect only
/// after a restart; the loop never re-reads shared configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub api_key: String,
    pub interval_seconds: u64,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(VigilError::Precondition("API key is not configured".into()));
        }
        if self.interval_seconds < MIN_INTERVAL_SECONDS {
            return Err(VigilError::Precondition(format!(
                "interval must be at least {MIN_INTERVAL_SECONDS} seconds"
            )));
        }
        Ok(())
    }
}

pub const MIN_INTERVAL_SECONDS: u64 = 2;
pub const DEFAULT_INTERVAL_SECONDS: u64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    #[serde(default = "default_warmup_retries")]
    pub warmup_retries: u32,
    #[serde(default = "default_warmup_delay_ms")]
    pub warmup_delay_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            jpeg_quality: default_jpeg_quality(),
            poll_interval_ms: default_poll_interval_ms(),
            frame_timeout_ms: default_frame_timeout_ms(),
            warmup_retries: default_warmup_retries(),
            warmup_delay_ms: default_warmup_delay_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_frame_timeout_ms() -> u64 {
    3000
}
fn default_warmup_retries() -> u32 {
    20
}
fn default_warmup_delay_ms() -> u64 {
    500
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_error_backoff_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pinned addresses for the endpoint host, consulted when the system
    /// resolver fails.
    #[serde(default = "default_fallback_addrs")]
    pub fallback_addrs: Vec<IpAddr>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            fallback_addrs: default_fallback_addrs(),
        }
    }
}

fn default_endpoint_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_fallback_addrs() -> Vec<IpAddr> {
    use std::net::Ipv4Addr;
    vec![
        IpAddr::V4(Ipv4Addr::new(104, 18, 2, 115)),
        IpAddr::V4(Ipv4Addr::new(104, 18, 3, 115)),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_tone_ms")]
    pub tone_ms: u64,
    #[serde(default = "default_gap_ms")]
    pub gap_ms: u64,
    #[serde(default = "default_repeats")]
    pub repeats: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            tone_ms: default_tone_ms(),
            gap_ms: default_gap_ms(),
            repeats: default_repeats(),
        }
    }
}

fn default_tone_ms() -> u64 {
    500
}
fn default_gap_ms() -> u64 {
    200
}
fn default_repeats() -> u32 {
    3
}

/// Detection settings as persisted by the host's configuration store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub enabled: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            interval_seconds: default_interval_seconds(),
            enabled: false,
        }
    }
}

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub ops: OpsConfig,
}

impl VigilConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            VigilError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            VigilError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(VigilError::Configuration(
                "capture.width and capture.height must be greater than zero".into(),
            ));
        }
        if self.capture.width % 2 != 0 || self.capture.height % 2 != 0 {
            return Err(VigilError::Configuration(
                "capture dimensions must be even for 4:2:0 subsampling".into(),
            ));
        }
        if self.capture.poll_interval_ms == 0 {
            return Err(VigilError::Configuration(
                "capture.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.capture.frame_timeout_ms < self.capture.poll_interval_ms {
            return Err(VigilError::Configuration(
                "capture.frame_timeout_ms must be at least one poll interval".into(),
            ));
        }
        if self.analysis.endpoint_url.is_empty() {
            return Err(VigilError::Configuration(
                "analysis.endpoint_url must not be empty".into(),
            ));
        }
        if self.analysis.timeout_secs == 0 {
            return Err(VigilError::Configuration(
                "analysis.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.alert.repeats == 0 {
            return Err(VigilError::Configuration(
                "alert.repeats must be greater than zero".into(),
            ));
        }
        if self.detection.interval_seconds < MIN_INTERVAL_SECONDS {
            return Err(VigilError::Configuration(format!(
                "detection.interval_seconds must be at least {MIN_INTERVAL_SECONDS}"
            )));
        }
        Ok(())
    }

    /// Snapshot of the loop-facing settings, taken once at start.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            api_key: self.detection.api_key.clone().unwrap_or_default(),
            interval_seconds: self.detection.interval_seconds,
        }
    }
}
