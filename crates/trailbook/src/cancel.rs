//! Cooperative cancellation for fetches and report rendering.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable handle used to cancel in-flight operations.
///
/// All clones share one signal. Once cancelled, a token stays cancelled
/// unless [`CancelToken::reset`] is called.
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            signal: Arc::new(tx),
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    /// Check if cancellation has been signaled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }

    /// Clear the signal so the token can be reused.
    pub fn reset(&self) {
        self.signal.send_replace(false);
    }

    /// Wait until the token is cancelled.
    ///
    /// Resolves immediately if cancellation was already signaled.
    pub async fn cancelled(&self) {
        let mut rx = self.signal.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_reset() {
        let token = CancelToken::default();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_when_signaled() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("wait should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled");
    }
}
