//! Cancellable delay primitive.
//!
//! Grounded on the backoff sleep in `orchestrator::crawl_pages`, which races
//! a plain `tokio::time::sleep` against cancellation. Here the cancellation
//! side is a `CancellationToken` rather than an abort flag check after the
//! fact, so the wait returns as soon as the signal fires instead of after a
//! fixed delay.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `ms` milliseconds, or return early with `true` if `token` is
/// cancelled (including if it was already cancelled before the call).
/// Returns `false` if the full duration elapsed undisturbed.
pub async fn sleep(ms: u64, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(ms)) => false,
        () = token.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapses_normally() {
        let token = CancellationToken::new();
        let cancelled = sleep(10, &token).await;
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn returns_true_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let cancelled = sleep(10_000, &token).await;
        assert!(cancelled);
    }

    #[tokio::test]
    async fn returns_true_when_cancelled_mid_wait() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            child.cancel();
        });
        let cancelled = sleep(10_000, &token).await;
        assert!(cancelled);
    }
}
