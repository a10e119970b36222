//! Error types for remote camera access

use thiserror::Error;

/// Result type for camera operations
pub type Result<T> = std::result::Result<T, CameraError>;

/// Camera client error types
///
/// The enum is `Clone` so that a cached decode failure can be handed out on
/// every access to a lazily decoded image.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CameraError {
    /// Connection or framing failure below the request/response layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote side answered a request with an error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// Format tag outside the wire enumeration, or an unknown MIME type
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Bytes do not parse as the claimed format
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Distortion model name unknown, or its parameters rejected
    #[error("Unresolved distortion model {model:?}: {reason}")]
    UnresolvedDistortionModel { model: String, reason: String },

    /// Intrinsics missing or out of range when a projector was requested
    #[error("Invalid intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// Response carried a MIME type the caller cannot accept
    #[error("Unexpected MIME type: expected {expected}, got {actual}")]
    UnexpectedMimeType { expected: String, actual: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Client or stream already closed
    #[error("Closed: {0}")]
    Closed(String),
}

impl From<serde_json::Error> for CameraError {
    fn from(err: serde_json::Error) -> Self {
        CameraError::Serialization(err.to_string())
    }
}

/// Error codes carried in wire `Error` responses
pub mod error_codes {
    pub const UNKNOWN_RESOURCE: i32 = -32000;
    pub const UNSUPPORTED_MIME_TYPE: i32 = -32001;
    pub const CAPTURE_FAILED: i32 = -32002;
    pub const INVALID_REQUEST: i32 = -32602;
    pub const METHOD_NOT_FOUND: i32 = -32601;
}
