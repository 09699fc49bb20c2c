//! Counter store port and the in-process adapter.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Counter store failures. Any of these makes the store unavailable for the
/// current check.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Counter store connection failed: {0}")]
    Connection(String),

    #[error("Counter store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Port for an atomic, expiring counter shared by all request handlers.
///
/// `consume` must increment and read in one atomic step: two concurrent calls
/// on the same key must observe different counts.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Increment `key` and return the new count. The counter expires `ttl`
    /// after it was first created.
    async fn consume(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at_ms: u64,
}

/// Entries beyond this count make expired counters eligible for a sweep.
const SWEEP_THRESHOLD: usize = 10_000;

/// Minimum spacing between two sweeps.
const SWEEP_INTERVAL_MS: u64 = 60_000;

/// Process-local counter store.
///
/// Only correct when a single server process handles all traffic for an
/// identity.
#[derive(Debug)]
pub struct MemoryCounterStore {
    counters: DashMap<String, Counter>,
    clock: Arc<dyn Clock>,
    next_sweep_ms: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
            next_sweep_ms: AtomicU64::new(0),
        }
    }

    /// Number of live and not yet swept counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop expired counters, at most once per [`SWEEP_INTERVAL_MS`]. Only the
    /// caller that claims the slot pays for the pass.
    fn maybe_sweep(&self, now_ms: u64) {
        if self.counters.len() <= SWEEP_THRESHOLD {
            return;
        }
        let due = self.next_sweep_ms.load(Ordering::Acquire);
        if now_ms < due {
            return;
        }
        if self
            .next_sweep_ms
            .compare_exchange(due, now_ms + SWEEP_INTERVAL_MS, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.counters.retain(|_, c| c.expires_at_ms > now_ms);
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn consume(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now_millis();
        let expires_at_ms = now + ttl.as_millis() as u64;

        let count = {
            // The entry guard holds the shard lock for the whole read-modify-write.
            let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
                count: 0,
                expires_at_ms,
            });
            if entry.expires_at_ms <= now {
                *entry = Counter {
                    count: 0,
                    expires_at_ms,
                };
            }
            entry.count += 1;
            entry.count
        };

        self.maybe_sweep(now);

        Ok(count)
    }
}
