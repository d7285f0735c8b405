// Job Cancellation Token

use tokio::sync::watch;

/// Cancellation signal observed by batch pools and stage runners
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check if cancellation was requested
    pub fn is_cancel_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the cancellation signal
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

/// Cancellation sender held by the job manager
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Signal cancellation to all observers
    pub fn request_cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancel() {
        let (source, token) = cancel_channel();
        assert!(!token.is_cancel_requested());
        source.request_cancel();
        assert!(token.is_cancel_requested());

        let mut waiter = token.clone();
        waiter.cancelled().await; // already cancelled, returns immediately
    }

    #[tokio::test]
    async fn clones_share_the_signal() {
        let (source, token) = cancel_channel();
        let cloned = token.clone();
        source.request_cancel();
        assert!(cloned.is_cancel_requested());
    }
}
