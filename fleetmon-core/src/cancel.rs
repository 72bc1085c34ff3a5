//! Cooperative cancellation for scans, poll loops and reconnect tasks

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Cancellation token for long-running operations
///
/// This token can be cloned and shared across tasks. When `cancel()` is
/// called, every clone observes it: synchronously via [`is_cancelled`] or
/// asynchronously via [`cancelled`].
///
/// [`is_cancelled`]: Self::is_cancelled
/// [`cancelled`]: Self::cancelled
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Creates a new cancellation token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels all operations using this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Checks if the token has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
