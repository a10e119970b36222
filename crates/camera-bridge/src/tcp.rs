//! TCP transport for camera hosts
//!
//! Camera hosts listen on a TCP port and speak the length-prefixed JSON
//! protocol from [`crate::protocol`].

use crate::transport::{Connection, DEFAULT_MAX_MESSAGE_SIZE, FrameReader, FrameWriter};
use camera_core::{CameraError, Result};
use tokio::net::TcpStream;
use tokio::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the host address
pub const ADDRESS_ENV: &str = "REMOTE_CAMERA_ADDR";
/// Environment variable overriding the request timeout, in milliseconds
pub const TIMEOUT_ENV: &str = "REMOTE_CAMERA_TIMEOUT_MS";

/// Configuration for a TCP camera connection
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Camera host address (host:port)
    pub address: String,
    /// Timeout for connecting and for each request
    pub request_timeout: Duration,
    /// Largest accepted response frame
    pub max_message_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8765".to_string(),
            request_timeout: Duration::from_secs(10),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl TcpConfig {
    /// Defaults, overridden by `REMOTE_CAMERA_ADDR` and `REMOTE_CAMERA_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            config.address = address;
        }
        if let Some(ms) = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Create config for a specific host
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Connect to a camera host over TCP
pub async fn connect(config: &TcpConfig) -> Result<Connection> {
    info!("Connecting to camera host at {}", config.address);

    let stream = tokio::time::timeout(config.request_timeout, TcpStream::connect(&config.address))
        .await
        .map_err(|_| CameraError::Transport(format!("Connection timeout to {}", config.address)))?
        .map_err(|e| {
            CameraError::Transport(format!("Failed to connect to {}: {}", config.address, e))
        })?;

    // Disable Nagle's algorithm for low latency
    stream
        .set_nodelay(true)
        .map_err(|e| CameraError::Transport(format!("Failed to set TCP_NODELAY: {}", e)))?;

    let (read_half, write_half) = stream.into_split();
    debug!("Connected to {}", config.address);

    Ok(Connection::new(
        FrameReader::new(read_half, config.max_message_size),
        FrameWriter::new(write_half),
        config.request_timeout,
    ))
}
