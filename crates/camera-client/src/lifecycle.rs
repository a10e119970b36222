//! Generation-scoped stream lifecycle
//!
//! A client may be closed when its connection goes bad and reused once the
//! connection comes back. Each healthy stretch is a *generation*, marked by a
//! [`Signal`] that fires when the client is closed. Stream workers bind to
//! the generation that was live when they started.
//!
//! Closing fires the generation, waits for every worker bound to it to exit,
//! then clears it so the next stream starts a fresh generation. Starting a
//! worker and closing take the same lock, so a worker either joins the
//! outgoing generation (and is waited for) or the next one (and is left
//! alone). Workers from two generations never run at the same time.

use crate::stream::{ErrorHandler, StreamItem, StreamSink};
use camera_core::{Scope, Signal};
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Worker {
    handle: JoinHandle<()>,
    stream_closed: Signal,
}

struct Generation {
    signal: Signal,
    workers: Vec<Worker>,
    /// Streams of pruned workers; closed along with the generation
    exited: Vec<Signal>,
}

impl Generation {
    fn new() -> Self {
        debug!("Starting new stream generation");
        Self {
            signal: Signal::new(),
            workers: Vec::new(),
            exited: Vec::new(),
        }
    }

    /// Drop finished workers, keeping their streams for `close`
    fn prune(&mut self) {
        let (finished, running): (Vec<Worker>, Vec<Worker>) = std::mem::take(&mut self.workers)
            .into_iter()
            .partition(|w| w.handle.is_finished());
        self.workers = running;
        self.exited
            .extend(finished.into_iter().map(|w| w.stream_closed));
        self.exited.retain(|closed| !closed.is_fired());
    }
}

/// Owns the live generation and the workers bound to it
pub struct StreamLifecycle {
    state: Mutex<Option<Generation>>,
}

impl StreamLifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// The live generation signal, created if there is none
    pub async fn ensure_generation(&self) -> Signal {
        let mut state = self.state.lock().await;
        state.get_or_insert_with(Generation::new).signal.clone()
    }

    /// Spawn a worker that repeatedly runs `read` and publishes into `sink`
    /// until the caller's scope is cancelled, the consumer goes away, or the
    /// generation closes.
    pub async fn start_worker<F, Fut>(
        &self,
        scope: Scope,
        read: F,
        sink: StreamSink,
        handlers: Vec<ErrorHandler>,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = StreamItem> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        let generation = state.get_or_insert_with(Generation::new);
        generation.prune();

        let stream_closed = sink.close_signal();
        let handle = tokio::spawn(run_worker(
            generation.signal.clone(),
            scope,
            read,
            sink,
            handlers,
        ));
        generation.workers.push(Worker {
            handle,
            stream_closed,
        });
    }

    /// Fire the live generation and wait for all of its workers to exit.
    ///
    /// Idempotent; with no live generation this returns immediately.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let Some(generation) = state.take() else {
            return;
        };
        generation.signal.fire();

        let count = generation.workers.len();
        for worker in generation.workers {
            if let Err(e) = worker.handle.await {
                if e.is_panic() {
                    warn!("Stream worker panicked: {}", e);
                }
            }
            // a worker that left on its own scope never closed its stream
            worker.stream_closed.fire();
        }
        for closed in generation.exited {
            closed.fire();
        }
        debug!("Stream generation closed, drained {} workers", count);
    }

    /// Workers of the live generation that have not exited yet
    pub async fn active_workers(&self) -> usize {
        let state = self.state.lock().await;
        state.as_ref().map_or(0, |generation| {
            generation
                .workers
                .iter()
                .filter(|w| !w.handle.is_finished())
                .count()
        })
    }
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamLifecycle {
    fn drop(&mut self) {
        // No awaiting here; workers see the signal and exit on their own
        if let Some(generation) = self.state.get_mut() {
            generation.signal.fire();
        }
    }
}

async fn run_worker<F, Fut>(
    generation: Signal,
    scope: Scope,
    mut read: F,
    sink: StreamSink,
    handlers: Vec<ErrorHandler>,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = StreamItem> + Send,
{
    loop {
        if scope.is_cancelled() {
            return;
        }

        let item = tokio::select! {
            biased;
            _ = generation.fired() => {
                sink.close();
                return;
            }
            _ = scope.cancelled() => return,
            _ = sink.closed() => return,
            item = read() => item,
        };

        if let Err(err) = &item {
            for handler in &handlers {
                handler(err);
            }
        }

        // Generation closure wins over everything else
        tokio::select! {
            biased;
            _ = generation.fired() => {
                if !sink.close() {
                    warn!("Stream was already closed when its generation ended");
                }
                return;
            }
            _ = scope.cancelled() => return,
            sent = sink.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::channel;
    use camera_core::{CameraError, CameraImage, LazyEncodedImage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn frame() -> StreamItem {
        Ok(CameraImage::Lazy(LazyEncodedImage::new(vec![0], "image/png")))
    }

    async fn frames() -> StreamItem {
        tokio::time::sleep(Duration::from_millis(1)).await;
        frame()
    }

    #[tokio::test]
    async fn test_close_without_generation() {
        let lifecycle = StreamLifecycle::new();
        lifecycle.close().await;
        lifecycle.close().await;
        assert_eq!(lifecycle.active_workers().await, 0);
    }

    #[tokio::test]
    async fn test_fresh_generation_after_close() {
        let lifecycle = StreamLifecycle::new();
        let first = lifecycle.ensure_generation().await;
        assert!(first.same_as(&lifecycle.ensure_generation().await));

        lifecycle.close().await;
        assert!(first.is_fired());

        let second = lifecycle.ensure_generation().await;
        assert!(!second.same_as(&first));
        assert!(!second.is_fired());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_drains_workers() {
        let lifecycle = StreamLifecycle::new();
        let (sink, mut stream) = channel(1);
        lifecycle
            .start_worker(Scope::new(), frames, sink, Vec::new())
            .await;

        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(lifecycle.active_workers().await, 1);

        tokio::time::timeout(Duration::from_secs(5), lifecycle.close())
            .await
            .unwrap();
        assert_eq!(lifecycle.active_workers().await, 0);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_scope_cancel_stops_only_that_worker() {
        let lifecycle = StreamLifecycle::new();
        let scope = Scope::new();
        let (sink_a, mut stream_a) = channel(1);
        let (sink_b, mut stream_b) = channel(1);
        lifecycle
            .start_worker(scope.clone(), frames, sink_a, Vec::new())
            .await;
        lifecycle
            .start_worker(Scope::new(), frames, sink_b, Vec::new())
            .await;

        assert!(stream_a.next().await.is_some());
        scope.cancel();
        // drain whatever was buffered before the cancel landed
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while stream_a.next().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
        assert!(stream_b.next().await.unwrap().is_ok());

        lifecycle.close().await;
    }

    #[tokio::test]
    async fn test_errors_reach_handlers_and_stream() {
        let lifecycle = StreamLifecycle::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handler: ErrorHandler = Arc::new(move |_: &CameraError| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (sink, mut stream) = channel(1);
        lifecycle
            .start_worker(
                Scope::new(),
                || async { Err(CameraError::Transport("unreachable".into())) },
                sink,
                vec![handler.clone(), handler],
            )
            .await;

        for _ in 0..3 {
            assert!(matches!(
                stream.next().await,
                Some(Err(CameraError::Transport(_)))
            ));
        }
        lifecycle.close().await;
        assert!(seen.load(Ordering::SeqCst) >= 6);
    }

    #[tokio::test]
    async fn test_finished_workers_are_pruned() {
        let lifecycle = StreamLifecycle::new();
        let (sink, mut stream) = channel(1);
        lifecycle
            .start_worker(Scope::new(), frames, sink, Vec::new())
            .await;
        stream.close();

        tokio::time::timeout(Duration::from_secs(5), async {
            while lifecycle.active_workers().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let (sink, _stream) = channel(1);
        lifecycle
            .start_worker(Scope::new(), frames, sink, Vec::new())
            .await;
        assert_eq!(lifecycle.active_workers().await, 1);
        lifecycle.close().await;
    }

    async fn wait_idle(lifecycle: &StreamLifecycle) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while lifecycle.active_workers().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_close_ends_pruned_streams() {
        let lifecycle = StreamLifecycle::new();
        let scope = Scope::new();
        let (sink, mut stream) = channel(1);
        lifecycle
            .start_worker(scope.clone(), frames, sink, Vec::new())
            .await;

        // one frame taken, the next one left in the buffer
        assert!(stream.next().await.unwrap().is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();
        wait_idle(&lifecycle).await;

        // starting another worker prunes the exited one
        let (sink, _other) = channel(1);
        lifecycle
            .start_worker(Scope::new(), frames, sink, Vec::new())
            .await;
        lifecycle.close().await;

        assert!(stream.is_closed());
        assert!(stream.next().await.is_none());
    }
}
