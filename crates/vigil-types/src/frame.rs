use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Planar YUV 4:2:0 buffer as delivered by a capture device.
///
/// The chroma planes are each a quarter of the luma plane (half resolution
/// in both dimensions). Width and height refer to the luma plane and must
/// both be even.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl RawFrame {
    /// Allocate a black frame of the given dimensions.
    pub fn black(width: u32, height: u32) -> Self {
        let luma = (width * height) as usize;
        Self {
            width,
            height,
            y: vec![0; luma],
            u: vec![128; luma / 4],
            v: vec![128; luma / 4],
        }
    }
}

/// An encoded image ready for analysis, plus its encoding timestamp.
///
/// Instances are transient: published into a single-slot mailbox, consumed
/// by whichever reader polls first, and overwritten by the next capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    pub encoded_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(jpeg: Vec<u8>) -> Self {
        Self {
            jpeg,
            encoded_at: Utc::now(),
        }
    }
}
