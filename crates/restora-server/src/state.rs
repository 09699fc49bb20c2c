//! Shared application state.

use std::sync::Arc;

use restora_core::{Error, RateLimitConfig, RestoraConfig, StoreBackend};
use restora_jobs::{JobOrchestrator, ReplicateRunner};
use restora_ratelimit::{
    CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore, StoreFailurePolicy,
};
use tracing::info;

use crate::auth::{HeaderIdentityResolver, IdentityResolver};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: RestoraConfig,
    /// `None` when rate limiting is disabled; every request is then allowed.
    pub limiter: Option<RateLimiter>,
    pub orchestrator: JobOrchestrator,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(
        config: RestoraConfig,
        limiter: Option<RateLimiter>,
        orchestrator: JobOrchestrator,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            config,
            limiter,
            orchestrator,
            identity,
        }
    }

    /// Build production state: connect the counter store and the job runner.
    pub async fn from_config(config: RestoraConfig) -> restora_core::Result<Self> {
        let limiter = match &config.rate_limit {
            Some(rate_limit) => Some(build_limiter(rate_limit).await?),
            None => None,
        };

        let runner = ReplicateRunner::new(&config.runner).map_err(|e| Error::Http(e.to_string()))?;
        let orchestrator = JobOrchestrator::new(Arc::new(runner), &config.polling);

        let identity =
            HeaderIdentityResolver::new(&config.auth.identity_header).map_err(Error::Config)?;

        Ok(Self::new(config, limiter, orchestrator, Arc::new(identity)))
    }
}

async fn build_limiter(config: &RateLimitConfig) -> restora_core::Result<RateLimiter> {
    let store: Arc<dyn CounterStore> = match &config.store {
        StoreBackend::Redis { url } => Arc::new(
            RedisCounterStore::connect(url)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?,
        ),
        StoreBackend::Memory => Arc::new(MemoryCounterStore::new()),
    };

    let policy = if config.fail_open {
        StoreFailurePolicy::FailOpen
    } else {
        StoreFailurePolicy::FailClosed
    };

    info!(
        "Rate limiting enabled: {} requests per {}s, {:?}",
        config.requests,
        config.window.as_secs(),
        policy
    );

    Ok(RateLimiter::new(store, config.requests, config.window)
        .with_key_prefix(config.key_prefix.clone())
        .with_failure_policy(policy))
}
