//! Client-side view of a remote camera service

use crate::protocol::{
    DoCommandRequest, GetImageRequest, GetImageResponse, GetImagesRequest, GetImagesResponse,
    GetPointCloudRequest, GetPointCloudResponse, GetPropertiesRequest,
};
use async_trait::async_trait;
use camera_core::{Result, WireProperties};
use serde_json::{Map, Value};

/// Request/response calls against a remote camera
///
/// Implementations must be safe to share between tasks; the client issues
/// calls concurrently from the caller and from every active stream.
#[async_trait]
pub trait CameraService: Send + Sync + 'static {
    /// Fetch one image
    async fn get_image(&self, request: GetImageRequest) -> Result<GetImageResponse>;

    /// Fetch every image the camera produces at once
    async fn get_images(&self, request: GetImagesRequest) -> Result<GetImagesResponse>;

    /// Fetch a point cloud
    async fn get_point_cloud(&self, request: GetPointCloudRequest)
    -> Result<GetPointCloudResponse>;

    /// Fetch camera properties
    async fn get_properties(&self, request: GetPropertiesRequest) -> Result<WireProperties>;

    /// Run an arbitrary command
    async fn do_command(&self, request: DoCommandRequest) -> Result<Map<String, Value>>;
}
