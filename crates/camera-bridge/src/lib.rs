//! Wire protocol and transports for remote cameras
//!
//! This crate provides:
//! - Request/response messages exchanged with a camera host
//! - The `CameraService` trait, the client's view of the remote camera
//! - Length-prefixed framing and a background reader that routes responses
//! - A TCP transport

pub mod protocol;
pub mod service;
pub mod tcp;
pub mod transport;

pub use protocol::{CameraRequest, CameraResponse, Envelope, deserialize, serialize};
pub use service::CameraService;
pub use tcp::{TcpConfig, connect};
pub use transport::{
    AsyncReader, AsyncWriter, Connection, DEFAULT_MAX_MESSAGE_SIZE, FrameReader, FrameWriter,
};
