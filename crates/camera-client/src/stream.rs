//! Consumer side of a camera stream
//!
//! A worker publishes into a [`StreamSink`]; the caller pulls from the paired
//! [`VideoStream`]. Either side can close the stream. Once closed, the
//! consumer sees no further frames, even ones already buffered.

use camera_core::{CameraError, CameraImage, Signal};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One stream value. A failed read carries only the error.
pub type StreamItem = Result<CameraImage, CameraError>;

/// Callback invoked with every read error a stream worker hits
pub type ErrorHandler = Arc<dyn Fn(&CameraError) + Send + Sync>;

/// Create a connected sink/stream pair
pub(crate) fn channel(capacity: usize) -> (StreamSink, VideoStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closed = Signal::new();
    (
        StreamSink {
            tx,
            closed: closed.clone(),
        },
        VideoStream { rx, closed },
    )
}

/// Producer half, owned by a stream worker
pub struct StreamSink {
    tx: mpsc::Sender<StreamItem>,
    closed: Signal,
}

impl StreamSink {
    /// Wait for buffer space and publish; fails once the consumer is gone
    pub(crate) async fn send(&self, item: StreamItem) -> Result<(), CameraError> {
        if self.closed.is_fired() {
            return Err(CameraError::Closed("stream closed".into()));
        }
        self.tx
            .send(item)
            .await
            .map_err(|_| CameraError::Closed("stream consumer dropped".into()))
    }

    /// End the stream for the consumer
    pub(crate) fn close(&self) -> bool {
        self.closed.fire()
    }

    /// Resolves when the consumer closes or drops its half
    pub(crate) async fn closed(&self) {
        tokio::select! {
            _ = self.closed.fired() => {}
            _ = self.tx.closed() => {}
        }
    }

    pub(crate) fn close_signal(&self) -> Signal {
        self.closed.clone()
    }
}

/// Stream of images produced by [`crate::CameraClient::stream`]
pub struct VideoStream {
    rx: mpsc::Receiver<StreamItem>,
    closed: Signal,
}

impl VideoStream {
    /// Next frame or read error, in read order. `None` once the stream has
    /// been closed by either side.
    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.closed.is_fired() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.closed.fired() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop the stream; its worker exits at its next suspension point
    pub fn close(&mut self) {
        self.closed.fire();
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }
}

impl fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}
