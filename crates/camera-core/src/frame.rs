//! Camera images and the format-dispatch decode pipeline
//!
//! Images come back from the remote camera either with a MIME type (single
//! image reads) or with a [`Format`] tag (image bundles). Concrete formats are
//! wrapped in a [`LazyEncodedImage`] that holds the encoded bytes and only
//! decodes pixels on first access. Payloads without a format are sniffed and
//! decoded eagerly.

use crate::codec;
use crate::error::{CameraError, Result};
use crate::format::Format;
use crate::mime;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::fmt;
use std::sync::OnceLock;

/// Encoded image whose pixels are decoded on first access
#[derive(Clone)]
pub struct LazyEncodedImage {
    bytes: Vec<u8>,
    mime_type: String,
    decoded: OnceLock<Result<DynamicImage>>,
}

impl LazyEncodedImage {
    /// Wrap encoded bytes. A `+lazy` qualifier on the MIME type is dropped.
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime::check_lazy(mime_type).0.to_string(),
            decoded: OnceLock::new(),
        }
    }

    /// MIME type of the encoded bytes, without any lazy qualifier
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The encoded bytes as received
    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether pixel decoding has been attempted yet
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Decoded pixels. The first call decodes, later calls reuse the result,
    /// including a failed one.
    pub fn decoded(&self) -> Result<&DynamicImage> {
        self.decoded
            .get_or_init(|| decode_pixels(&self.bytes, &self.mime_type))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl fmt::Debug for LazyEncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("decoded", &self.is_decoded())
            .finish()
    }
}

/// Image returned by the camera client
#[derive(Debug, Clone)]
pub enum CameraImage {
    /// Encoded bytes, decoded on first pixel access
    Lazy(LazyEncodedImage),
    /// Pixels decoded up front
    Decoded {
        image: DynamicImage,
        mime_type: String,
    },
}

impl CameraImage {
    /// MIME type the image was delivered as
    pub fn mime_type(&self) -> &str {
        match self {
            CameraImage::Lazy(lazy) => lazy.mime_type(),
            CameraImage::Decoded { mime_type, .. } => mime_type,
        }
    }

    /// Whether this image defers decoding
    pub fn is_lazy(&self) -> bool {
        matches!(self, CameraImage::Lazy(_))
    }

    /// Pixel access; decodes lazy images on first use
    pub fn pixels(&self) -> Result<&DynamicImage> {
        match self {
            CameraImage::Lazy(lazy) => lazy.decoded(),
            CameraImage::Decoded { image, .. } => Ok(image),
        }
    }

    /// Width and height in pixels
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        self.pixels().map(|img| img.dimensions())
    }

    /// Encoded bytes, when the image still carries them
    pub fn encoded_bytes(&self) -> Option<&[u8]> {
        match self {
            CameraImage::Lazy(lazy) => Some(lazy.raw_bytes()),
            CameraImage::Decoded { .. } => None,
        }
    }
}

/// Image plus the name of the sensor that produced it
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub image: CameraImage,
    pub source_name: String,
}

impl NamedImage {
    pub fn new(image: CameraImage, source_name: impl Into<String>) -> Self {
        Self {
            image,
            source_name: source_name.into(),
        }
    }
}

/// Decode an image delivered with a MIME type.
///
/// A `+lazy` qualifier yields a [`CameraImage::Lazy`]; otherwise the pixels
/// are decoded immediately. An empty MIME type falls back to sniffing.
pub fn decode_image(bytes: Vec<u8>, mime_type: &str) -> Result<CameraImage> {
    let (base, lazy) = mime::check_lazy(mime_type);
    if base.is_empty() {
        return sniff(bytes);
    }
    if lazy {
        return Ok(CameraImage::Lazy(LazyEncodedImage::new(bytes, base)));
    }
    let image = decode_pixels(&bytes, base)?;
    Ok(CameraImage::Decoded {
        image,
        mime_type: base.to_string(),
    })
}

/// Decode an image delivered with a wire format tag.
///
/// Known formats stay lazy. [`Format::Unspecified`] is sniffed and decoded
/// eagerly. Tags outside the enumeration are rejected.
pub fn decode_format(bytes: Vec<u8>, format_tag: i32) -> Result<CameraImage> {
    let mime_type = match Format::try_from(format_tag)? {
        Format::RawRgba => mime::MIME_TYPE_RAW_RGBA,
        Format::RawDepth => mime::MIME_TYPE_RAW_DEPTH,
        Format::Jpeg => mime::MIME_TYPE_JPEG,
        Format::Png => mime::MIME_TYPE_PNG,
        Format::Unspecified => return sniff(bytes),
    };
    Ok(CameraImage::Lazy(LazyEncodedImage::new(bytes, mime_type)))
}

/// Work out the format from the bytes themselves and decode eagerly
fn sniff(bytes: Vec<u8>) -> Result<CameraImage> {
    let mime_type = if codec::is_raw_rgba(&bytes) {
        mime::MIME_TYPE_RAW_RGBA
    } else if codec::is_raw_depth(&bytes) {
        mime::MIME_TYPE_RAW_DEPTH
    } else {
        match image::guess_format(&bytes) {
            Ok(ImageFormat::Png) => mime::MIME_TYPE_PNG,
            Ok(ImageFormat::Jpeg) => mime::MIME_TYPE_JPEG,
            Ok(other) => {
                return Err(CameraError::UnsupportedFormat(format!(
                    "{:?} images are not supported",
                    other
                )));
            }
            Err(_) => {
                return Err(CameraError::MalformedPayload(
                    "could not determine image format".into(),
                ));
            }
        }
    };

    let image = decode_pixels(&bytes, mime_type)?;
    Ok(CameraImage::Decoded {
        image,
        mime_type: mime_type.to_string(),
    })
}

fn decode_pixels(bytes: &[u8], mime_type: &str) -> Result<DynamicImage> {
    match Format::from_mime_type(mime_type) {
        Format::RawRgba => codec::decode_raw_rgba(bytes),
        Format::RawDepth => codec::decode_raw_depth(bytes),
        Format::Jpeg => load(bytes, ImageFormat::Jpeg),
        Format::Png => load(bytes, ImageFormat::Png),
        Format::Unspecified => Err(CameraError::UnsupportedFormat(format!(
            "cannot decode MIME type {:?}",
            mime_type
        ))),
    }
}

fn load(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CameraError::MalformedPayload(format!("{:?}: {}", format, e)))
}
