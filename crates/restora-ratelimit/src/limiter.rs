//! Fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::{CounterStore, StoreError};
use crate::types::{millis_to_datetime, Identity, RateLimitDecision};
use crate::window::FixedWindow;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Identity must be a non-empty string")]
    InvalidIdentity,

    #[error("Rate limit store unavailable: {0}")]
    BackingStoreUnavailable(#[source] StoreError),
}

/// What a check does when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFailurePolicy {
    /// Reject the request with [`RateLimitError::BackingStoreUnavailable`].
    #[default]
    FailClosed,
    /// Admit the request as if it were the first in its window.
    FailOpen,
}

/// Per-identity fixed-window limiter.
///
/// Each [`check`](Self::check) consumes one permit, allowed or not, so it must
/// run at most once per incoming request.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    window: FixedWindow,
    limit: u32,
    key_prefix: String,
    failure_policy: StoreFailurePolicy,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` checks per `window` per identity.
    pub fn new(store: Arc<dyn CounterStore>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock::new()),
            window: FixedWindow::new(window),
            limit,
            key_prefix: "restora:ratelimit:".into(),
            failure_policy: StoreFailurePolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> FixedWindow {
        self.window
    }

    pub fn failure_policy(&self) -> StoreFailurePolicy {
        self.failure_policy
    }

    /// Current time on the clock that decides windows. Retry hints derived
    /// from a decision must be measured against this, not the system clock.
    pub fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.clock.now_millis())
    }

    /// Consume one permit for `identity` and report whether it was within quota.
    pub async fn check(&self, identity: &str) -> Result<RateLimitDecision, RateLimitError> {
        let identity = Identity::new(identity)?;
        let now = self.clock.now_millis();
        let index = self.window.index(now);
        let reset_at = self.window.reset_at(now);
        let key = format!("{}{}:{}", self.key_prefix, identity, index);

        match self.store.consume(&key, self.window.remaining(now)).await {
            Ok(count) => {
                let decision = RateLimitDecision::from_count(count, self.limit, reset_at);
                debug!(
                    identity = %identity,
                    count,
                    allowed = decision.allowed,
                    remaining = decision.remaining,
                    "Rate limit checked"
                );
                Ok(decision)
            }
            Err(e) => match self.failure_policy {
                StoreFailurePolicy::FailClosed => {
                    warn!(error = %e, "Rate limit store unavailable, rejecting request");
                    Err(RateLimitError::BackingStoreUnavailable(e))
                }
                StoreFailurePolicy::FailOpen => {
                    warn!(error = %e, "Rate limit store unavailable, allowing request");
                    Ok(RateLimitDecision::from_count(0, self.limit, reset_at))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Store double that fails every call and records the keys it saw.
    #[derive(Debug, Default)]
    struct RecordingStore {
        keys: Mutex<Vec<(String, Duration)>>,
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn consume(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
            self.keys.lock().unwrap().push((key.to_string(), ttl));
            Err(StoreError::Connection("connection refused".into()))
        }
    }

    fn limiter_at(start_ms: u64, limit: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let store = Arc::new(MemoryCounterStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(store, limit, DAY).with_clock(clock.clone());
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_quota_of_two_per_day() {
        let start = 1_700_000_000_000;
        let (limiter, _clock) = limiter_at(start, 2);

        let first = limiter.check("a@x.com").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.check("a@x.com").await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check("a@x.com").await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.limit, 2);
        assert_eq!(third.remaining, 0);
        assert!(third.reset_at.timestamp_millis() as u64 > start);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let (limiter, _clock) = limiter_at(0, 1);
        assert!(limiter.check("a@x.com").await.unwrap().allowed);
        assert!(!limiter.check("a@x.com").await.unwrap().allowed);
        assert!(limiter.check("b@x.com").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_quota_renews_at_window_edge() {
        let (limiter, clock) = limiter_at(DAY.as_millis() as u64 - 1_000, 1);
        assert!(limiter.check("a@x.com").await.unwrap().allowed);
        assert!(!limiter.check("a@x.com").await.unwrap().allowed);

        // Edges are shared by all identities: one second later is a new window.
        clock.advance(Duration::from_secs(1));
        let renewed = limiter.check("a@x.com").await.unwrap();
        assert!(renewed.allowed);
        assert_eq!(
            renewed.reset_at.timestamp_millis() as u64,
            2 * DAY.as_millis() as u64
        );
    }

    #[tokio::test]
    async fn test_retry_after_follows_limiter_clock() {
        // 2023-11-14T23:13:20Z; the day window resets at 2023-11-15T00:00:00Z.
        let (limiter, clock) = limiter_at(1_700_003_600_000, 1);
        limiter.check("a@x.com").await.unwrap();
        let denied = limiter.check("a@x.com").await.unwrap();
        assert!(!denied.allowed);

        let now = limiter.now();
        assert_eq!(now.timestamp_millis(), 1_700_003_600_000);
        assert_eq!(denied.retry_after_secs(now), 2_800);
        let retry = denied.retry_after(now);
        assert_eq!((retry.hours, retry.minutes), (0, 46));

        clock.advance(Duration::from_secs(46 * 60));
        let retry = denied.retry_after(limiter.now());
        assert_eq!((retry.hours, retry.minutes), (0, 0));
        assert_eq!(denied.retry_after_secs(limiter.now()), 40);
    }

    #[tokio::test]
    async fn test_invalid_identity_consumes_nothing() {
        let store = Arc::new(MemoryCounterStore::new());
        let limiter = RateLimiter::new(store.clone(), 2, DAY);
        assert!(matches!(
            limiter.check("   ").await,
            Err(RateLimitError::InvalidIdentity)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fail_closed_by_default() {
        let limiter = RateLimiter::new(Arc::new(RecordingStore::default()), 2, DAY);
        assert_eq!(limiter.failure_policy(), StoreFailurePolicy::FailClosed);
        assert!(matches!(
            limiter.check("a@x.com").await,
            Err(RateLimitError::BackingStoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_open_allows() {
        let limiter = RateLimiter::new(Arc::new(RecordingStore::default()), 2, DAY)
            .with_failure_policy(StoreFailurePolicy::FailOpen);
        let decision = limiter.check("a@x.com").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_key_layout_and_ttl() {
        let store = Arc::new(RecordingStore::default());
        let clock = Arc::new(ManualClock::new(90_000));
        let limiter = RateLimiter::new(store.clone(), 1, Duration::from_secs(60))
            .with_clock(clock)
            .with_key_prefix("test:")
            .with_failure_policy(StoreFailurePolicy::FailOpen);

        limiter.check("a@x.com").await.unwrap();

        let keys = store.keys.lock().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "test:a@x.com:1");
        assert_eq!(keys[0].1, Duration::from_secs(30));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_over_admit() {
        let (limiter, _clock) = limiter_at(0, 1);
        let limiter = Arc::new(limiter);

        let checks = (0..16).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check("a@x.com").await.unwrap().allowed })
        });
        let results = futures::future::join_all(checks).await;

        let admitted = results
            .into_iter()
            .filter(|joined| matches!(joined, Ok(true)))
            .count();
        assert_eq!(admitted, 1);
    }
}
