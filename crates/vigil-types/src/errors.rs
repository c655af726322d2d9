use thiserror::Error;

pub type Result<T, E = VigilError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
///
/// The pipeline distinguishes fatal conditions (a start precondition, an
/// unopenable camera) from per-iteration ones (timeouts, encode or network
/// trouble) that the loop absorbs and retries.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("camera not ready")]
    CameraNotReady,
    #[error("capture timed out after {0} ms")]
    CaptureTimeout(u64),
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("name resolution failed: {0}")]
    Resolution(String),
    #[error("API error: {0}")]
    HttpStatus(u16),
    #[error("response parse failed: {0}")]
    Parse(String),
    #[error("analysis error: {0}")]
    Analysis(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("orchestrator error: {0}")]
    Orchestrator(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
