//! MIME types understood by the camera client
//!
//! A MIME type may carry a `+lazy` qualifier, which asks the decoder to keep
//! the encoded bytes around and defer pixel decoding until first access.

/// JPEG images
pub const MIME_TYPE_JPEG: &str = "image/jpeg";
/// PNG images
pub const MIME_TYPE_PNG: &str = "image/png";
/// Raw RGBA container, see [`crate::codec`]
pub const MIME_TYPE_RAW_RGBA: &str = "image/x-raw-rgba";
/// Raw 16-bit depth container, see [`crate::codec`]
pub const MIME_TYPE_RAW_DEPTH: &str = "image/x-raw-depth";
/// Point Cloud Data files
pub const MIME_TYPE_PCD: &str = "pointcloud/pcd";

/// Suffix marking a MIME type as lazily decoded
pub const LAZY_SUFFIX: &str = "+lazy";

/// Append the lazy qualifier unless it is already present.
pub fn with_lazy(mime_type: &str) -> String {
    if mime_type.ends_with(LAZY_SUFFIX) {
        mime_type.to_string()
    } else {
        format!("{mime_type}{LAZY_SUFFIX}")
    }
}

/// Split a MIME type into its base type and whether it was lazy-qualified.
pub fn check_lazy(mime_type: &str) -> (&str, bool) {
    match mime_type.strip_suffix(LAZY_SUFFIX) {
        Some(base) => (base, true),
        None => (mime_type, false),
    }
}
