//! Optional per-request hooks around one connection's lifetime.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hooks invoked once when a request starts and once when it ends.
///
/// Both methods default to no-ops, so implementors override only what they
/// need. A generated id is attached to the request's tracing span.
pub trait RequestLifecycle: Send + Sync {
    /// Called before the frame is read; returns an id for the request.
    fn request_id_generate(&self) -> Option<String> {
        None
    }

    /// Called after the answer was written or the request was abandoned.
    fn request_id_clear(&self) {}
}

/// Lifecycle without request ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl RequestLifecycle for NoopLifecycle {}

/// Lifecycle numbering requests from one, process wide.
#[derive(Debug, Default)]
pub struct SequentialRequestIds {
    next: AtomicU64,
}

impl SequentialRequestIds {
    /// Creates a counter starting at one.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestLifecycle for SequentialRequestIds {
    fn request_id_generate(&self) -> Option<String> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Some(format!("req-{id}"))
    }
}
