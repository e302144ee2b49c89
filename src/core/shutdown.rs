//! Cooperative cancellation shared by the pipeline stages.
//!
//! One `watch` channel carries a single flag. Stages race their work against
//! [`wait_for_shutdown`] and unwind with their own interrupt error once the
//! flag flips to `true`.

use tokio::sync::watch;

/// Create the channel used to tell running stages to stop
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// A receiver that never reports shutdown
pub fn never_shutdown() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// Whether shutdown has already been requested
pub fn is_shutdown(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Resolves once shutdown has been requested; never resolves if the sender is gone
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_send() {
        let (tx, mut rx) = shutdown_channel();
        assert!(!is_shutdown(&rx));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        tokio::time::timeout(Duration::from_secs(5), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
        assert!(is_shutdown(&rx));
    }

    #[tokio::test]
    async fn test_dropped_sender_never_fires() {
        let mut rx = never_shutdown();
        let waited = tokio::time::timeout(Duration::from_millis(20), wait_for_shutdown(&mut rx)).await;
        assert!(waited.is_err());
    }
}
