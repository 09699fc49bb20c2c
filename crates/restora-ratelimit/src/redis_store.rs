//! Redis-backed counter store.
//!
//! Lets every server instance share the same quota accounting. Consumption
//! runs as a Lua script so the increment and the expiry are applied in one
//! server-side step:
//!
//! ```text
//! INCR key          -> n
//! if n == 1: PEXPIRE key ttl_ms
//! ```
//!
//! A key therefore lives exactly as long as the window it counts.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, info};

use crate::store::{CounterStore, StoreError};

const CONSUME_SCRIPT: &str = r#"
local current = redis.call("INCR", KEYS[1])
if current == 1 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
end
return current
"#;

/// Counter store shared across processes through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("Redis counter store connected");

        Ok(Self {
            connection,
            script: Script::new(CONSUME_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn consume(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let mut invocation = self.script.key(key);
        invocation.arg(ttl_ms);
        let count: u64 = invocation.invoke_async(&mut conn).await?;

        debug!(key = %key, count, "Consumed rate limit permit");
        Ok(count)
    }
}
