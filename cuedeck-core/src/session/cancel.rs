//! Out-of-band cancel signal for racing a pending commit.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared flag raised by `cancel_edit` before the request is queued.
///
/// The coordinator watches it while a commit is pending, so a cancel can
/// overtake a save that has not resolved yet.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Raises the flag.
    pub fn request(&self) {
        self.sender.send_replace(true);
    }

    /// Lowers the flag.
    pub fn reset(&self) {
        self.sender.send_replace(false);
    }

    pub fn is_requested(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the flag is raised. Returns immediately if it already is.
    pub async fn requested(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|requested| *requested).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_requested_resolves_after_request() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();

        let task = tokio::spawn(async move { waiter.requested().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());

        signal.request();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_clears_flag() {
        let signal = CancelSignal::new();
        signal.request();
        assert!(signal.is_requested());

        signal.reset();
        assert!(!signal.is_requested());

        let pending = tokio::time::timeout(Duration::from_millis(10), signal.requested()).await;
        assert!(pending.is_err());
    }
}
