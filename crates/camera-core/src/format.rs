//! Wire image format enumeration

use crate::error::{CameraError, Result};
use crate::mime;
use serde::{Deserialize, Serialize};

/// Image format tag carried next to each image in a bundle
///
/// The set is fixed. Values arrive on the wire as integers and are converted
/// with [`Format::try_from`], which rejects anything outside the enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum Format {
    Unspecified = 0,
    RawRgba = 1,
    RawDepth = 2,
    Jpeg = 3,
    Png = 4,
}

impl Format {
    /// MIME type for a concrete format, `None` when the format must be sniffed
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Format::Unspecified => None,
            Format::RawRgba => Some(mime::MIME_TYPE_RAW_RGBA),
            Format::RawDepth => Some(mime::MIME_TYPE_RAW_DEPTH),
            Format::Jpeg => Some(mime::MIME_TYPE_JPEG),
            Format::Png => Some(mime::MIME_TYPE_PNG),
        }
    }

    /// Format for a (possibly lazy-qualified) MIME type
    pub fn from_mime_type(mime_type: &str) -> Format {
        match mime::check_lazy(mime_type).0 {
            mime::MIME_TYPE_RAW_RGBA => Format::RawRgba,
            mime::MIME_TYPE_RAW_DEPTH => Format::RawDepth,
            mime::MIME_TYPE_JPEG => Format::Jpeg,
            mime::MIME_TYPE_PNG => Format::Png,
            _ => Format::Unspecified,
        }
    }
}

impl TryFrom<i32> for Format {
    type Error = CameraError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Format::Unspecified),
            1 => Ok(Format::RawRgba),
            2 => Ok(Format::RawDepth),
            3 => Ok(Format::Jpeg),
            4 => Ok(Format::Png),
            other => Err(CameraError::UnsupportedFormat(format!(
                "format tag {} is not a known image format",
                other
            ))),
        }
    }
}

impl From<Format> for i32 {
    fn from(format: Format) -> Self {
        format as i32
    }
}
