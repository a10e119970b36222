//! Raw pixel containers
//!
//! Two uncompressed containers travel next to JPEG and PNG:
//! - RGBA: `b"RGBA"`, u32 BE width, u32 BE height, then 4 bytes per pixel
//! - Depth: `b"DEPTHMAP"`, u64 BE width, u64 BE height, then a u16 BE
//!   depth value (millimetres) per pixel

use crate::error::{CameraError, Result};
use image::{DynamicImage, ImageBuffer, Luma, Rgba};

const RGBA_MAGIC: &[u8; 4] = b"RGBA";
const RGBA_HEADER_LEN: usize = 12;
const DEPTH_MAGIC: &[u8; 8] = b"DEPTHMAP";
const DEPTH_HEADER_LEN: usize = 24;

/// Whether the bytes start with the raw RGBA magic
pub fn is_raw_rgba(bytes: &[u8]) -> bool {
    bytes.starts_with(RGBA_MAGIC)
}

/// Whether the bytes start with the raw depth magic
pub fn is_raw_depth(bytes: &[u8]) -> bool {
    bytes.starts_with(DEPTH_MAGIC)
}

/// Decode a raw RGBA container into an RGBA8 image
pub fn decode_raw_rgba(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.len() < RGBA_HEADER_LEN || !is_raw_rgba(bytes) {
        return Err(CameraError::MalformedPayload(
            "raw RGBA payload is missing its header".into(),
        ));
    }
    let width = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let height = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let pixels = &bytes[RGBA_HEADER_LEN..];

    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| CameraError::MalformedPayload("raw RGBA dimensions overflow".into()))?;
    if pixels.len() != expected {
        return Err(CameraError::MalformedPayload(format!(
            "raw RGBA {}x{} needs {} bytes, got {}",
            width,
            height,
            expected,
            pixels.len()
        )));
    }

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels.to_vec())
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| CameraError::MalformedPayload("raw RGBA buffer rejected".into()))
}

/// Encode an image into the raw RGBA container
pub fn encode_raw_rgba(image: &DynamicImage) -> Vec<u8> {
    let rgba = image.to_rgba8();
    let mut out = Vec::with_capacity(RGBA_HEADER_LEN + rgba.as_raw().len());
    out.extend_from_slice(RGBA_MAGIC);
    out.extend_from_slice(&rgba.width().to_be_bytes());
    out.extend_from_slice(&rgba.height().to_be_bytes());
    out.extend_from_slice(rgba.as_raw());
    out
}

/// Decode a raw depth container into a 16-bit luma image
pub fn decode_raw_depth(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.len() < DEPTH_HEADER_LEN || !is_raw_depth(bytes) {
        return Err(CameraError::MalformedPayload(
            "raw depth payload is missing its header".into(),
        ));
    }
    let width = read_u64_be(&bytes[8..16]);
    let height = read_u64_be(&bytes[16..24]);
    let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(CameraError::MalformedPayload(format!(
                "raw depth dimensions {}x{} out of range",
                width, height
            )));
        }
    };

    let data = &bytes[DEPTH_HEADER_LEN..];
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(2))
        .ok_or_else(|| CameraError::MalformedPayload("raw depth dimensions overflow".into()))?;
    if data.len() != expected {
        return Err(CameraError::MalformedPayload(format!(
            "raw depth {}x{} needs {} bytes, got {}",
            width,
            height,
            expected,
            data.len()
        )));
    }

    let depth: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    ImageBuffer::<Luma<u16>, _>::from_raw(width, height, depth)
        .map(DynamicImage::ImageLuma16)
        .ok_or_else(|| CameraError::MalformedPayload("raw depth buffer rejected".into()))
}

/// Encode a depth map (row-major, millimetres) into the raw depth container
pub fn encode_raw_depth(width: u32, height: u32, depth: &[u16]) -> Result<Vec<u8>> {
    if depth.len() != width as usize * height as usize {
        return Err(CameraError::MalformedPayload(format!(
            "depth map {}x{} needs {} values, got {}",
            width,
            height,
            width as usize * height as usize,
            depth.len()
        )));
    }
    let mut out = Vec::with_capacity(DEPTH_HEADER_LEN + depth.len() * 2);
    out.extend_from_slice(DEPTH_MAGIC);
    out.extend_from_slice(&u64::from(width).to_be_bytes());
    out.extend_from_slice(&u64::from(height).to_be_bytes());
    for value in depth {
        out.extend_from_slice(&value.to_be_bytes());
    }
    Ok(out)
}

fn read_u64_be(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
