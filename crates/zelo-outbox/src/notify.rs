//! Best-effort worker nudge.
//!
//! After a successful enqueue the service pokes the worker so the new item
//! is picked up before the next poll tick. The nudge is latency sugar only:
//! its failures are swallowed by the caller and the periodic poll remains
//! the correctness guarantee.

use std::{fmt, sync::Arc};

use tokio::sync::Notify;

use crate::error::Result;

/// Signals the worker that new work may be available.
#[async_trait::async_trait]
pub trait WorkerNotifier: Send + Sync + fmt::Debug {
    /// Wakes the worker. Callers treat failures as advisory.
    async fn nudge(&self) -> Result<()>;
}

/// In-process nudge backed by a tokio [`Notify`].
///
/// The enqueue side calls [`nudge`](WorkerNotifier::nudge); the runner
/// awaits [`notified`](NotifyHandle::notified) alongside its poll timer.
#[derive(Debug, Clone, Default)]
pub struct NotifyHandle {
    inner: Arc<Notify>,
}

impl NotifyHandle {
    /// Creates a fresh handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves when a nudge arrives.
    ///
    /// A nudge sent while nobody is waiting is remembered and wakes the
    /// next waiter immediately.
    pub async fn notified(&self) {
        self.inner.notified().await;
    }
}

#[async_trait::async_trait]
impl WorkerNotifier for NotifyHandle {
    async fn nudge(&self) -> Result<()> {
        self.inner.notify_one();
        Ok(())
    }
}

/// Notifier that does nothing, for deployments relying on the poll alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait::async_trait]
impl WorkerNotifier for NoopNotifier {
    async fn nudge(&self) -> Result<()> {
        Ok(())
    }
}
