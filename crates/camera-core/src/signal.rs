//! One-shot broadcast signal
//!
//! A [`Signal`] starts unfired and can be fired any number of times; only the
//! first call has an effect. Every clone observes the same state, and every
//! task waiting in [`Signal::fired`] is woken when it fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

/// Cloneable fire-once flag with async waiting
#[derive(Debug, Clone, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        let first = !self.inner.fired.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Wait until the signal fires; returns immediately if it already has
    pub async fn fired(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent fire is not lost
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }

    /// Whether two handles refer to the same signal
    pub fn same_as(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
