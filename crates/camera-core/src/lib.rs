//! # camera-core
//!
//! Core types and pipelines for consuming a remotely hosted camera.
//!
//! This crate provides the transport-agnostic pieces used by the client:
//! - Error taxonomy shared by every crate in the workspace
//! - MIME type helpers and the fixed wire format enumeration
//! - Lazy/eager image decoding with exhaustive format dispatch
//! - Camera properties, intrinsics and pluggable distortion models
//! - Point cloud reading
//! - Cancellation scopes and one-shot broadcast signals

pub mod codec;
pub mod distortion;
pub mod error;
pub mod format;
pub mod frame;
pub mod intrinsics;
pub mod metadata;
pub mod mime;
pub mod pointcloud;
pub mod properties;
pub mod scope;
pub mod signal;

pub use distortion::{Distorter, DistortionRegistry};
pub use error::{CameraError, Result, error_codes};
pub use format::Format;
pub use frame::{CameraImage, LazyEncodedImage, NamedImage, decode_format, decode_image};
pub use intrinsics::{PinholeCameraIntrinsics, Projector};
pub use metadata::ResponseMetadata;
pub use pointcloud::{Point, PointCloud, read_pcd};
pub use properties::{DistortionParameters, IntrinsicParameters, Properties, WireProperties};
pub use scope::Scope;
pub use signal::Signal;
