//! Client configuration

/// Tuning for a [`crate::CameraClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Frames a stream buffers before its worker waits on the consumer
    pub stream_buffer: usize,
    /// MIME type requested by `read` when the scope carries no hint
    pub default_mime_type: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stream_buffer: 1,
            default_mime_type: None,
        }
    }
}

impl ClientConfig {
    pub fn with_stream_buffer(mut self, frames: usize) -> Self {
        // mpsc channels reject a zero capacity
        self.stream_buffer = frames.max(1);
        self
    }

    pub fn with_default_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.default_mime_type = Some(mime_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_stream_buffer(0)
            .with_default_mime_type("image/png+lazy");
        assert_eq!(config.stream_buffer, 1);
        assert_eq!(config.default_mime_type.as_deref(), Some("image/png+lazy"));
    }
}
