//! Planar-YUV to JPEG conversion.

use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};
use vigil_types::{frame::RawFrame, Result, VigilError};

/// Encode a planar YUV 4:2:0 frame as JPEG bytes.
///
/// Pure function of its inputs; a failure here is recoverable at the call
/// site and treated as "no frame available", never as fatal.
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Vec<u8>> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(encode_error(format!(
            "unsupported frame dimensions {}x{}",
            frame.width, frame.height
        )));
    }
    let luma = width * height;
    let chroma = luma / 4;
    if frame.y.len() != luma || frame.u.len() != chroma || frame.v.len() != chroma {
        return Err(encode_error(format!(
            "plane sizes {}/{}/{} do not match {}x{}",
            frame.y.len(),
            frame.u.len(),
            frame.v.len(),
            frame.width,
            frame.height
        )));
    }

    let mut rgb = RgbImage::new(frame.width, frame.height);
    for row in 0..height {
        for col in 0..width {
            let y = frame.y[row * width + col] as f32;
            let chroma_idx = (row / 2) * (width / 2) + col / 2;
            let u = frame.u[chroma_idx] as f32 - 128.0;
            let v = frame.v[chroma_idx] as f32 - 128.0;

            let r = y + 1.402 * v;
            let g = y - 0.344 * u - 0.714 * v;
            let b = y + 1.772 * u;
            rgb.put_pixel(
                col as u32,
                row as u32,
                image::Rgb([clamp(r), clamp(g), clamp(b)]),
            );
        }
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), frame.width, frame.height, ColorType::Rgb8)
        .map_err(|err| encode_error(format!("jpeg encode failed: {err}")))?;
    Ok(out)
}

fn clamp(value: f32) -> u8 {
    value.round().max(0.0).min(255.0) as u8
}

fn encode_error(message: impl Into<String>) -> VigilError {
    VigilError::Encode(message.into())
}
