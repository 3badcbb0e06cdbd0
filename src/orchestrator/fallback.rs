//! Cancellable fallback timer
//!
//! Delivers a message after a fixed delay unless cancelled first. The
//! message fires at most once; cancelling after the fact is a no-op.
//! Dropping the handle cancels the timer too.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

pub struct FallbackTimer {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl FallbackTimer {
    /// Arm the timer: after `delay`, send `msg` on `tx` unless cancelled
    pub fn start<T: Send + 'static>(delay: Duration, tx: mpsc::Sender<T>, msg: T) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {
                    let _ = tx.send(msg).await;
                }
                _ = cancel_rx => {}
            }
        });

        Self {
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Cancel the timer. No-op if it already fired.
    pub fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(1);
        let _timer = FallbackTimer::start(Duration::from_secs(5), tx, "elapsed");

        advance(Duration::from_millis(4_999)).await;
        assert!(rx.try_recv().is_err());

        advance(Duration::from_millis(2)).await;
        assert_eq!(rx.recv().await, Some("elapsed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel::<&str>(1);
        let timer = FallbackTimer::start(Duration::from_secs(5), tx, "elapsed");
        timer.cancel();

        advance(Duration::from_secs(10)).await;
        // Sender dropped without sending
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_noop() {
        let (tx, mut rx) = mpsc::channel(1);
        let timer = FallbackTimer::start(Duration::from_millis(1), tx, "elapsed");

        advance(Duration::from_millis(5)).await;
        let fired = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(fired, Some("elapsed"));

        timer.cancel();
        assert_eq!(rx.recv().await, None);
    }
}
