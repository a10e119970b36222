//! # camera-client
//!
//! Typed, cancellable access to a remotely hosted camera.
//!
//! [`CameraClient`] wraps any [`camera_bridge::CameraService`] and exposes
//! single reads, background streams, image bundles, point clouds, properties,
//! projectors and opaque commands. Closing the client stops every stream and
//! waits for its workers; the same client can stream again afterwards.
//!
//! ```no_run
//! use camera_client::{CameraClient, Scope};
//! use std::sync::Arc;
//!
//! # async fn demo() -> camera_core::Result<()> {
//! let connection = camera_bridge::connect(&camera_bridge::TcpConfig::from_env()).await?;
//! let client = CameraClient::new("front", Arc::new(connection));
//!
//! let scope = Scope::new().with_mime_hint("image/jpeg+lazy");
//! let image = client.read(&scope).await?;
//! println!("{} {:?}", image.mime_type(), image.dimensions()?);
//!
//! let mut stream = client.stream(&scope, Vec::new()).await?;
//! if let Some(frame) = stream.next().await {
//!     println!("{}", frame?.mime_type());
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod stream;

pub use camera_core::Scope;
pub use client::{CameraClient, CameraClientBuilder};
pub use config::ClientConfig;
pub use lifecycle::StreamLifecycle;
pub use stream::{ErrorHandler, StreamItem, VideoStream};
