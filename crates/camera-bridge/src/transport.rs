//! Transport abstractions for camera connections
//!
//! Provides AsyncReader/AsyncWriter traits that can be implemented for
//! different transport mechanisms, length-prefixed framing over any tokio
//! byte stream, and [`Connection`], which multiplexes concurrent requests
//! over one reader/writer pair.

use crate::protocol::{
    CameraRequest, CameraResponse, DoCommandRequest, Envelope, GetImageRequest, GetImageResponse,
    GetImagesRequest, GetImagesResponse, GetPointCloudRequest, GetPointCloudResponse,
    GetPropertiesRequest, RpcError, deserialize, serialize,
};
use crate::service::CameraService;
use async_trait::async_trait;
use camera_core::{CameraError, Result, WireProperties};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Largest message accepted by default (64MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Trait for async reading from a transport
#[async_trait]
pub trait AsyncReader: Send {
    /// Read a complete message from the transport
    async fn read_message(&mut self) -> Result<Vec<u8>>;
}

/// Trait for async writing to a transport
#[async_trait]
pub trait AsyncWriter: Send + Sync {
    /// Write a complete message to the transport
    async fn write_message(&mut self, data: &[u8]) -> Result<()>;
}

/// Reads 4-byte little-endian length-prefixed messages
pub struct FrameReader<R> {
    inner: R,
    max_message_size: usize,
}

impl<R> FrameReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> AsyncReader for FrameReader<R> {
    async fn read_message(&mut self) -> Result<Vec<u8>> {
        let mut len_bytes = [0u8; 4];
        self.inner
            .read_exact(&mut len_bytes)
            .await
            .map_err(|e| CameraError::Transport(format!("Read length failed: {}", e)))?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > self.max_message_size {
            return Err(CameraError::Transport(format!(
                "Message too large: {} bytes",
                len
            )));
        }

        let mut data = vec![0u8; len];
        self.inner
            .read_exact(&mut data)
            .await
            .map_err(|e| CameraError::Transport(format!("Read data failed: {}", e)))?;

        Ok(data)
    }
}

/// Writes 4-byte little-endian length-prefixed messages
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + Sync> AsyncWriter for FrameWriter<W> {
    async fn write_message(&mut self, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| CameraError::Transport(format!("Message too large: {} bytes", data.len())))?
            .to_le_bytes();
        self.inner
            .write_all(&len)
            .await
            .map_err(|e| CameraError::Transport(format!("Write length failed: {}", e)))?;
        self.inner
            .write_all(data)
            .await
            .map_err(|e| CameraError::Transport(format!("Write data failed: {}", e)))?;
        self.inner
            .flush()
            .await
            .map_err(|e| CameraError::Transport(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

type ResponseSender = oneshot::Sender<Result<CameraResponse>>;

/// Requests waiting for a response, keyed by request id
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, ResponseSender>,
    closed: bool,
}

impl Pending {
    /// Never held across an await, so a plain mutex is enough
    fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the connection dead and fail every waiter
    fn fail_all(&mut self, reason: &str) {
        self.closed = true;
        for (_, response_tx) in self.waiters.drain() {
            let _ = response_tx.send(Err(CameraError::Transport(reason.to_string())));
        }
    }
}

/// Background reader task that routes responses to pending requests by id
async fn reader_task<R: AsyncReader>(mut reader: R, pending: Arc<Mutex<Pending>>) {
    loop {
        match reader.read_message().await {
            Ok(data) => {
                let json_preview: String =
                    String::from_utf8_lossy(&data).chars().take(200).collect();
                debug!("[Host→Client] len={} json={}", data.len(), json_preview);

                match deserialize::<CameraResponse>(&data) {
                    Ok(Envelope { id, body }) => {
                        let waiter = Pending::lock(&pending).waiters.remove(&id);
                        match waiter {
                            Some(response_tx) => {
                                let _ = response_tx.send(Ok(body));
                            }
                            None => warn!("Received response {} but no pending request", id),
                        }
                    }
                    Err(e) => {
                        error!("Failed to deserialize message: {}", e);
                        // fail the request it belongs to, if the id is readable
                        if let Some(id) = peek_id(&data) {
                            let waiter = Pending::lock(&pending).waiters.remove(&id);
                            if let Some(response_tx) = waiter {
                                let _ = response_tx.send(Err(e.into()));
                            }
                        }
                    }
                }
            }
            Err(e) => {
                info!("Reader task stopping: {}", e);
                Pending::lock(&pending).fail_all("Connection lost");
                break;
            }
        }
    }
}

/// Background writer task; owns the writer so a dropped request future can
/// never leave a half-written frame behind
async fn writer_task<W: AsyncWriter>(
    mut writer: W,
    mut outgoing_rx: mpsc::Receiver<Vec<u8>>,
    pending: Arc<Mutex<Pending>>,
) {
    while let Some(data) = outgoing_rx.recv().await {
        if let Err(e) = writer.write_message(&data).await {
            error!("Writer task failed: {}", e);
            Pending::lock(&pending).fail_all("Connection lost");
            return;
        }
    }
    debug!("Outgoing channel closed, writer task exiting");
}

/// Removes a request's waiter when its `call` future finishes or is dropped
struct WaiterGuard<'a> {
    pending: &'a Mutex<Pending>,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        Pending::lock(self.pending).waiters.remove(&self.id);
    }
}

fn peek_id(data: &[u8]) -> Option<u64> {
    serde_json::from_slice::<Value>(data)
        .ok()?
        .get("Id")?
        .as_u64()
}

/// Multiplexed request/response connection to a camera host
pub struct Connection {
    outgoing_tx: mpsc::Sender<Vec<u8>>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl Connection {
    /// Start the background reader and writer tasks for a transport
    pub fn new<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncReader + 'static,
        W: AsyncWriter + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let reader_handle = tokio::spawn(reader_task(reader, pending.clone()));
        let writer_handle = tokio::spawn(writer_task(writer, outgoing_rx, pending.clone()));

        Self {
            outgoing_tx,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader_handle,
            writer_handle,
        }
    }

    /// Whether the connection has been lost
    pub fn is_closed(&self) -> bool {
        Pending::lock(&self.pending).closed
    }

    /// Send a request and wait for its response.
    ///
    /// `Error` bodies are turned into [`CameraError::Rpc`].
    pub async fn call(&self, request: CameraRequest) -> Result<CameraResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind();
        let data = serialize(&Envelope { id, body: request })?;
        debug!("[Client→Host] {} id={} len={}", kind, id, data.len());

        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = Pending::lock(&self.pending);
            if pending.closed {
                return Err(CameraError::Transport("Connection closed".into()));
            }
            pending.waiters.insert(id, response_tx);
        }
        let _waiter = WaiterGuard {
            pending: &self.pending,
            id,
        };

        if self.outgoing_tx.send(data).await.is_err() {
            return Err(CameraError::Transport("Writer task not running".into()));
        }

        let body = match tokio::time::timeout(self.request_timeout, response_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(CameraError::Transport(
                    "Reader task died waiting for response".into(),
                ));
            }
            Err(_) => {
                return Err(CameraError::Transport(format!(
                    "{} timed out after {:?}",
                    kind, self.request_timeout
                )));
            }
        };

        match body {
            CameraResponse::Error(RpcError { code, message }) => {
                Err(CameraError::Rpc { code, message })
            }
            other => Ok(other),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

fn unexpected(expected: &str, got: &CameraResponse) -> CameraError {
    CameraError::Transport(format!(
        "Expected {} response, got {:?}",
        expected, got
    ))
}

#[async_trait]
impl CameraService for Connection {
    async fn get_image(&self, request: GetImageRequest) -> Result<GetImageResponse> {
        match self.call(CameraRequest::GetImage(request)).await? {
            CameraResponse::Image(resp) => Ok(resp),
            other => Err(unexpected("Image", &other)),
        }
    }

    async fn get_images(&self, request: GetImagesRequest) -> Result<GetImagesResponse> {
        match self.call(CameraRequest::GetImages(request)).await? {
            CameraResponse::Images(resp) => Ok(resp),
            other => Err(unexpected("Images", &other)),
        }
    }

    async fn get_point_cloud(
        &self,
        request: GetPointCloudRequest,
    ) -> Result<GetPointCloudResponse> {
        match self.call(CameraRequest::GetPointCloud(request)).await? {
            CameraResponse::PointCloud(resp) => Ok(resp),
            other => Err(unexpected("PointCloud", &other)),
        }
    }

    async fn get_properties(&self, request: GetPropertiesRequest) -> Result<WireProperties> {
        match self.call(CameraRequest::GetProperties(request)).await? {
            CameraResponse::Properties(props) => Ok(props),
            other => Err(unexpected("Properties", &other)),
        }
    }

    async fn do_command(&self, request: DoCommandRequest) -> Result<Map<String, Value>> {
        match self.call(CameraRequest::DoCommand(request)).await? {
            CameraResponse::CommandResult(resp) => Ok(resp.result),
            other => Err(unexpected("CommandResult", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_core::error_codes;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type HostReader = FrameReader<ReadHalf<DuplexStream>>;
    type HostWriter = FrameWriter<WriteHalf<DuplexStream>>;

    fn pair(timeout: Duration) -> (Connection, HostReader, HostWriter) {
        let (client_io, host_io) = tokio::io::duplex(1 << 16);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (host_read, host_write) = tokio::io::split(host_io);
        let connection = Connection::new(
            FrameReader::new(client_read, DEFAULT_MAX_MESSAGE_SIZE),
            FrameWriter::new(client_write),
            timeout,
        );
        (
            connection,
            FrameReader::new(host_read, DEFAULT_MAX_MESSAGE_SIZE),
            FrameWriter::new(host_write),
        )
    }

    async fn next_request(reader: &mut HostReader) -> Envelope<CameraRequest> {
        let data = reader.read_message().await.unwrap();
        deserialize(&data).unwrap()
    }

    async fn reply(writer: &mut HostWriter, id: u64, body: CameraResponse) {
        let data = serialize(&Envelope { id, body }).unwrap();
        writer.write_message(&data).await.unwrap();
    }

    fn image_body(mime_type: &str) -> CameraResponse {
        CameraResponse::Image(GetImageResponse {
            mime_type: mime_type.into(),
            image: vec![1, 2, 3],
        })
    }

    #[tokio::test]
    async fn test_out_of_order_responses_are_routed_by_id() {
        let (connection, mut host_reader, mut host_writer) = pair(Duration::from_secs(5));
        let connection = Arc::new(connection);

        let host = tokio::spawn(async move {
            let first = next_request(&mut host_reader).await;
            let second = next_request(&mut host_reader).await;
            // answer in reverse order, echoing the requested mime type
            for req in [second, first] {
                let CameraRequest::GetImage(get) = req.body else {
                    panic!("Expected GetImage");
                };
                reply(&mut host_writer, req.id, image_body(&get.mime_type)).await;
            }
        });

        let a = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .get_image(GetImageRequest {
                        name: "cam".into(),
                        mime_type: "image/png".into(),
                        extra: Map::new(),
                    })
                    .await
            })
        };
        let b = connection
            .get_image(GetImageRequest {
                name: "cam".into(),
                mime_type: "image/jpeg".into(),
                extra: Map::new(),
            })
            .await
            .unwrap();
        let a = a.await.unwrap().unwrap();

        assert_eq!(a.mime_type, "image/png");
        assert_eq!(b.mime_type, "image/jpeg");
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_body_becomes_rpc_error() {
        let (connection, mut host_reader, mut host_writer) = pair(Duration::from_secs(5));
        let host = tokio::spawn(async move {
            let req = next_request(&mut host_reader).await;
            reply(
                &mut host_writer,
                req.id,
                CameraResponse::Error(RpcError {
                    code: error_codes::UNKNOWN_RESOURCE,
                    message: "no camera named missing".into(),
                }),
            )
            .await;
        });

        let err = connection
            .get_properties(GetPropertiesRequest {
                name: "missing".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CameraError::Rpc {
                code: error_codes::UNKNOWN_RESOURCE,
                message: "no camera named missing".into()
            }
        );
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_response_type() {
        let (connection, mut host_reader, mut host_writer) = pair(Duration::from_secs(5));
        tokio::spawn(async move {
            let req = next_request(&mut host_reader).await;
            reply(&mut host_writer, req.id, image_body("image/png")).await;
        });

        let err = connection
            .get_images(GetImagesRequest { name: "cam".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Transport(_)));
    }

    #[tokio::test]
    async fn test_connection_loss_fails_pending_requests() {
        let (connection, mut host_reader, host_writer) = pair(Duration::from_secs(5));
        tokio::spawn(async move {
            let _ = next_request(&mut host_reader).await;
            drop(host_writer);
            drop(host_reader);
        });

        let err = connection
            .get_properties(GetPropertiesRequest { name: "cam".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Transport(_)));
        assert!(connection.is_closed());

        let again = connection
            .get_properties(GetPropertiesRequest { name: "cam".into() })
            .await;
        assert!(matches!(again, Err(CameraError::Transport(_))));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (connection, _host_reader, _host_writer) = pair(Duration::from_millis(50));
        let err = connection
            .do_command(DoCommandRequest {
                name: "cam".into(),
                command: Map::new(),
            })
            .await
            .unwrap_err();
        match err {
            CameraError::Transport(msg) => assert!(msg.contains("timed out")),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (client_io, mut host_io) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(client_io, 16);
        host_io.write_all(&100u32.to_le_bytes()).await.unwrap();
        match reader.read_message().await {
            Err(CameraError::Transport(msg)) => assert!(msg.contains("too large")),
            other => panic!("Expected size error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_call_releases_its_waiter() {
        let (connection, mut host_reader, _host_writer) = pair(Duration::from_secs(60));
        let connection = Arc::new(connection);

        let call = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .get_properties(GetPropertiesRequest { name: "cam".into() })
                    .await
            })
        };
        // the host sees the request but never answers
        let _ = next_request(&mut host_reader).await;
        assert_eq!(Pending::lock(&connection.pending).waiters.len(), 1);

        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());
        assert!(Pending::lock(&connection.pending).waiters.is_empty());
        assert!(!connection.is_closed());
    }
}
