//! Integration tests for the Redis counter store.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! They are ignored by default - run with `cargo test -p restora-ratelimit --test redis_store -- --ignored`

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use restora_ratelimit::{CounterStore, RateLimiter, RedisCounterStore};

const REDIS_URL: &str = "redis://127.0.0.1/";

/// Key prefix unique to this test run so reruns start from zero.
fn unique_prefix(test_name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("restora-test:{}:{}:", test_name, nanos)
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_consume_increments() {
    let Ok(store) = RedisCounterStore::connect(REDIS_URL).await else {
        eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
        return;
    };

    let key = format!("{}counter", unique_prefix("increments"));
    let ttl = Duration::from_secs(30);
    assert_eq!(store.consume(&key, ttl).await.unwrap(), 1);
    assert_eq!(store.consume(&key, ttl).await.unwrap(), 2);
    assert_eq!(store.consume(&key, ttl).await.unwrap(), 3);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_counter_expires() {
    let Ok(store) = RedisCounterStore::connect(REDIS_URL).await else {
        eprintln!("Skipping test: Redis not available");
        return;
    };

    let key = format!("{}expiring", unique_prefix("expires"));
    let ttl = Duration::from_millis(200);
    assert_eq!(store.consume(&key, ttl).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.consume(&key, ttl).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Redis
async fn test_redis_limiter_admits_exactly_quota() {
    let Ok(store) = RedisCounterStore::connect(REDIS_URL).await else {
        eprintln!("Skipping test: Redis not available");
        return;
    };

    let limiter = Arc::new(
        RateLimiter::new(Arc::new(store), 2, Duration::from_secs(60))
            .with_key_prefix(unique_prefix("quota")),
    );

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check("a@x.com").await.unwrap().allowed })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);
}

#[tokio::test]
#[ignore] // Requires a closed port
async fn test_redis_unreachable() {
    assert!(RedisCounterStore::connect("redis://127.0.0.1:1/").await.is_err());
}
