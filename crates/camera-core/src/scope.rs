//! Per-call request scope
//!
//! A [`Scope`] travels with every client call. It carries the caller's
//! cancellation signal, an optional MIME type hint for image reads, and extra
//! key/value parameters that are forwarded to the remote camera verbatim.

use crate::signal::Signal;
use serde_json::{Map, Value};

/// Cancellation, MIME hint and extra parameters for a client call
#[derive(Debug, Clone, Default)]
pub struct Scope {
    cancel: Signal,
    mime_hint: Option<String>,
    extra: Map<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a MIME type; a `+lazy` suffix requests lazy decoding
    pub fn with_mime_hint(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_hint = Some(mime_type.into());
        self
    }

    /// Add one extra parameter
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn mime_hint(&self) -> Option<&str> {
        self.mime_hint.as_deref()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Extra parameters layered over `defaults`; scope values win per key
    pub fn merged_extra(&self, defaults: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = defaults.clone();
        for (key, value) in &self.extra {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Cancel this scope and every clone of it
    pub fn cancel(&self) {
        self.cancel.fire();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_fired()
    }

    /// Wait for cancellation
    pub async fn cancelled(&self) {
        self.cancel.fired().await
    }
}
