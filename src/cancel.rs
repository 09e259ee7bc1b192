//! Cooperative cancellation for pipeline runs.
//!
//! A [`CancelToken`] is shared between a caller and one or more pipeline
//! runs. The orchestrator checks it before every stage and the retry driver
//! races each model attempt and each backoff sleep against it, so a set
//! token stops further model calls promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Reason reported when a document is abandoned through a [`CancelToken`].
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent `cancel`
            // cannot slip between the check and the wait.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn cancelled_resolves_for_waiters_and_late_callers() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woken")
            .unwrap();
        timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("already cancelled");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn uncancelled_token_stays_pending() {
        let token = CancelToken::new();
        assert!(timeout(Duration::from_millis(20), token.cancelled())
            .await
            .is_err());
    }
}
