//! Process-wide rate-limit coordination.
//!
//! When one client is throttled, every client sharing the same credential
//! waits out the block before its next attempt instead of discovering the
//! limit with its own failed call.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancellation::CancellationToken;
use crate::errors::ServiceError;

// Longest single block a coordinator records.
const MAX_BLOCK: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared "blocked until" instants keyed by credential.
#[derive(Debug, Default)]
pub struct RateLimitCoordinator {
    blocked_until: DashMap<String, Instant>,
}

impl RateLimitCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks `key` for `duration` from now, clamped to one day.
    /// An existing later block is kept.
    pub fn block(&self, key: &str, duration: Duration) {
        if duration > MAX_BLOCK {
            warn!(
                credential = key,
                requested_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                "Clamping rate-limit block"
            );
        }
        let Some(until) = Instant::now().checked_add(duration.min(MAX_BLOCK)) else {
            warn!(credential = key, "Rate-limit block overflows the clock; ignored");
            return;
        };
        self.blocked_until
            .entry(key.to_string())
            .and_modify(|current| {
                if until > *current {
                    *current = until;
                }
            })
            .or_insert(until);
    }

    /// Time left on the block for `key`, if any. Lapsed blocks are removed.
    #[must_use]
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let until = *self.blocked_until.get(key)?;
        if until > now {
            Some(until - now)
        } else {
            self.blocked_until.remove_if(key, |_, until| *until <= now);
            None
        }
    }

    /// Waits until `key` is no longer blocked, or fails if `cancel` fires.
    pub async fn wait(&self, key: &str, cancel: &CancellationToken) -> Result<(), ServiceError> {
        while let Some(remaining) = self.remaining(key) {
            debug!(
                credential = key,
                delay_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                "Waiting out shared rate-limit block"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(ServiceError::cancelled(
                        cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
                    ));
                }
                () = tokio::time::sleep(remaining) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_block_and_lapse() {
        let coordinator = RateLimitCoordinator::new();
        assert!(coordinator.remaining("k").is_none());

        coordinator.block("k", Duration::from_secs(10));
        assert_eq!(coordinator.remaining("k"), Some(Duration::from_secs(10)));
        assert!(coordinator.remaining("other").is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(coordinator.remaining("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_block_is_clamped() {
        let coordinator = RateLimitCoordinator::new();
        coordinator.block("k", Duration::MAX);
        assert_eq!(coordinator.remaining("k"), Some(MAX_BLOCK));

        coordinator.block("j", Duration::from_secs(u64::MAX));
        assert_eq!(coordinator.remaining("j"), Some(MAX_BLOCK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_block_does_not_shrink() {
        let coordinator = RateLimitCoordinator::new();
        coordinator.block("k", Duration::from_secs(30));
        coordinator.block("k", Duration::from_secs(5));
        assert_eq!(coordinator.remaining("k"), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_out_block() {
        let coordinator = RateLimitCoordinator::new();
        let cancel = CancellationToken::new();
        coordinator.block("k", Duration::from_secs(15));

        let started = Instant::now();
        coordinator.wait("k", &cancel).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let coordinator = Arc::new(RateLimitCoordinator::new());
        let cancel = Arc::new(CancellationToken::new());
        coordinator.block("k", Duration::from_secs(3600));

        let waiter = {
            let coordinator = coordinator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { coordinator.wait("k", &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel("shutdown");

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind, crate::errors::ServiceErrorKind::Cancelled);
    }
}
