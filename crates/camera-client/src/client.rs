//! Camera client facade
//!
//! Every operation makes one call to the [`CameraService`] and runs the
//! result through the matching decode or resolve step. Streams are served by
//! background workers managed by [`StreamLifecycle`].

use crate::config::ClientConfig;
use crate::lifecycle::StreamLifecycle;
use crate::stream::{self, ErrorHandler, VideoStream};
use camera_bridge::CameraService;
use camera_bridge::protocol::{
    DoCommandRequest, GetImageRequest, GetImagesRequest, GetPointCloudRequest,
    GetPropertiesRequest,
};
use camera_core::{
    CameraError, CameraImage, DistortionRegistry, NamedImage, PointCloud, Projector, Properties,
    ResponseMetadata, Result, Scope, decode_format, decode_image, mime, read_pcd,
};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared between the client and its stream workers
struct Shared {
    name: String,
    service: Arc<dyn CameraService>,
    config: ClientConfig,
    registry: DistortionRegistry,
    default_extra: Map<String, Value>,
}

/// Run one call, giving up early if the scope is cancelled
async fn scoped<T>(scope: &Scope, call: impl Future<Output = Result<T>>) -> Result<T> {
    if scope.is_cancelled() {
        return Err(CameraError::Closed("request cancelled".into()));
    }
    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(CameraError::Closed("request cancelled".into())),
        result = call => result,
    }
}

impl Shared {
    async fn read(&self, scope: &Scope) -> Result<CameraImage> {
        let hint = scope
            .mime_hint()
            .or(self.config.default_mime_type.as_deref())
            .unwrap_or_default();
        let (expected, lazy) = mime::check_lazy(hint);

        let request = GetImageRequest {
            name: self.name.clone(),
            mime_type: expected.to_string(),
            extra: scope.merged_extra(&self.default_extra),
        };
        let response = scoped(scope, self.service.get_image(request)).await?;

        if response.mime_type != expected {
            debug!(
                camera = %self.name,
                sent = expected,
                received = %response.mime_type,
                "Got different MIME type than what was asked for"
            );
        }

        // Without a hint the image stays lazy
        let mime_type = if lazy || expected.is_empty() {
            mime::with_lazy(&response.mime_type)
        } else {
            response.mime_type
        };
        decode_image(response.image, &mime_type)
    }
}

/// Client for one remote camera
///
/// Cheap to share behind an `Arc`; every operation takes `&self`. The client
/// survives [`CameraClient::close`] and can start new streams afterwards.
pub struct CameraClient {
    shared: Arc<Shared>,
    lifecycle: StreamLifecycle,
}

impl CameraClient {
    /// Client with default configuration and distortion models
    pub fn new(name: impl Into<String>, service: Arc<dyn CameraService>) -> Self {
        Self::builder(name, service).build()
    }

    pub fn builder(name: impl Into<String>, service: Arc<dyn CameraService>) -> CameraClientBuilder {
        CameraClientBuilder {
            name: name.into(),
            service,
            config: ClientConfig::default(),
            registry: DistortionRegistry::default(),
            default_extra: Map::new(),
        }
    }

    /// Remote resource name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Fetch a single image.
    ///
    /// The scope's MIME hint (or the configured default) is sent without its
    /// lazy qualifier. A different MIME type in the response is logged, not
    /// treated as an error.
    pub async fn read(&self, scope: &Scope) -> Result<CameraImage> {
        self.shared.read(scope).await
    }

    /// Start a background stream of images.
    ///
    /// The stream ends when `scope` is cancelled, when the returned
    /// [`VideoStream`] is closed, or when the client is closed. Read errors
    /// are passed to every handler and delivered on the stream; they do not
    /// end it.
    pub async fn stream(&self, scope: &Scope, handlers: Vec<ErrorHandler>) -> Result<VideoStream> {
        let (sink, video_stream) = stream::channel(self.shared.config.stream_buffer);
        let shared = self.shared.clone();
        let read_scope = scope.clone();
        let read = move || {
            let shared = shared.clone();
            let scope = read_scope.clone();
            async move { shared.read(&scope).await }
        };

        self.lifecycle
            .start_worker(scope.clone(), read, sink, handlers)
            .await;
        debug!(camera = %self.shared.name, "Stream started");
        Ok(video_stream)
    }

    /// Fetch every image the camera produces at once.
    ///
    /// Images with a known format stay lazy; unspecified ones are sniffed and
    /// decoded now.
    pub async fn images(&self, scope: &Scope) -> Result<(Vec<NamedImage>, ResponseMetadata)> {
        let request = GetImagesRequest {
            name: self.shared.name.clone(),
        };
        let response = scoped(scope, self.shared.service.get_images(request)).await?;

        let mut images = Vec::with_capacity(response.images.len());
        for img in response.images {
            let image = decode_format(img.image, img.format)?;
            images.push(NamedImage::new(image, img.source_name));
        }
        Ok((images, response.response_metadata))
    }

    /// Fetch and parse a point cloud
    pub async fn next_point_cloud(&self, scope: &Scope) -> Result<PointCloud> {
        let request = GetPointCloudRequest {
            name: self.shared.name.clone(),
            mime_type: mime::MIME_TYPE_PCD.to_string(),
            extra: scope.merged_extra(&self.shared.default_extra),
        };
        let response = scoped(scope, self.shared.service.get_point_cloud(request)).await?;

        if response.mime_type != mime::MIME_TYPE_PCD {
            return Err(CameraError::UnexpectedMimeType {
                expected: mime::MIME_TYPE_PCD.to_string(),
                actual: response.mime_type,
            });
        }
        read_pcd(&response.point_cloud)
    }

    /// Fetch properties, resolving any distortion model by name
    pub async fn properties(&self, scope: &Scope) -> Result<Properties> {
        let request = GetPropertiesRequest {
            name: self.shared.name.clone(),
        };
        let wire = scoped(scope, self.shared.service.get_properties(request)).await?;
        Properties::resolve(wire, &self.shared.registry)
    }

    /// Projector built from the camera's intrinsics, validated here
    pub async fn projector(&self, scope: &Scope) -> Result<Arc<dyn Projector>> {
        self.properties(scope).await?.projector()
    }

    /// Run an arbitrary command; the result is passed through untouched
    pub async fn do_command(
        &self,
        scope: &Scope,
        command: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let request = DoCommandRequest {
            name: self.shared.name.clone(),
            command,
        };
        scoped(scope, self.shared.service.do_command(request)).await
    }

    /// Stop every stream and wait for their workers to exit.
    ///
    /// Safe to call any number of times, including concurrently. The client
    /// can stream again afterwards.
    pub async fn close(&self) {
        self.lifecycle.close().await;
        info!(camera = %self.shared.name, "Camera client closed");
    }

    /// Stream workers still running
    pub async fn active_streams(&self) -> usize {
        self.lifecycle.active_workers().await
    }
}

impl fmt::Debug for CameraClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraClient")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Builder for [`CameraClient`]
pub struct CameraClientBuilder {
    name: String,
    service: Arc<dyn CameraService>,
    config: ClientConfig,
    registry: DistortionRegistry,
    default_extra: Map<String, Value>,
}

impl CameraClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Distortion models used by `properties`
    pub fn registry(mut self, registry: DistortionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Extra parameters sent with every image and point cloud request;
    /// scope extras override them key by key
    pub fn default_extra(mut self, extra: Map<String, Value>) -> Self {
        self.default_extra = extra;
        self
    }

    pub fn build(self) -> CameraClient {
        CameraClient {
            shared: Arc::new(Shared {
                name: self.name,
                service: self.service,
                config: self.config,
                registry: self.registry,
                default_extra: self.default_extra,
            }),
            lifecycle: StreamLifecycle::new(),
        }
    }
}
