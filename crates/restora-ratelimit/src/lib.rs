//! Per-identity fixed-window rate limiting.
//!
//! The limiter owns the window arithmetic and the decision; atomic counting is
//! delegated to a [`CounterStore`] (Redis in production, an in-process map for
//! single-instance deployments and tests).

pub mod clock;
pub mod limiter;
pub mod redis_store;
pub mod store;
pub mod types;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{RateLimitError, RateLimiter, StoreFailurePolicy};
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, MemoryCounterStore, StoreError};
pub use types::{Identity, RateLimitDecision, RetryAfter};
pub use window::FixedWindow;
