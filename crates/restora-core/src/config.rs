//! Process configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RUNNER_BASE_URL: &str = "https://api.replicate.com";
pub const DEFAULT_MODEL_VERSION: &str =
    "a07f252abbbd832009640b27f063ea52d87d7a23a185ca165bec23b5adc8deaf";
pub const DEFAULT_STYLE: &str = "Clay";
pub const DEFAULT_PROMPT: &str = "a person in a post apocalyptic war game";
pub const DEFAULT_INSTANT_ID_STRENGTH: f64 = 0.8;
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 2;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_RATE_LIMIT_KEY_PREFIX: &str = "restora:ratelimit:";
pub const DEFAULT_IDENTITY_HEADER: &str = "x-authenticated-email";

/// Connection settings for the external job runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub base_url: String,
    /// Static credential sent with every runner call.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Timeout applied to each individual HTTP call.
    pub http_timeout: Duration,
}

/// Model parameters sent as job payload data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub version: String,
    pub style: String,
    pub prompt: String,
    pub instant_id_strength: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_MODEL_VERSION.into(),
            style: DEFAULT_STYLE.into(),
            prompt: DEFAULT_PROMPT.into(),
            instant_id_strength: DEFAULT_INSTANT_ID_STRENGTH,
        }
    }
}

/// Where the rate limiter keeps its counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum StoreBackend {
    /// Shared Redis instance; safe across many server processes.
    Redis {
        #[serde(skip_serializing)]
        url: String,
    },
    /// Process-local counters; only correct for a single instance.
    Memory,
}

/// Fixed-window quota settings. Absent when rate limiting is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub store: StoreBackend,
    /// Permits per window.
    pub requests: u32,
    pub window: Duration,
    /// Allow requests through when the store is unreachable.
    pub fail_open: bool,
    pub key_prefix: String,
    /// Appended to the user-facing "renews in" message.
    pub support_contact: Option<String>,
}

/// Bounds on the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval: Duration,
    pub deadline: Duration,
    pub max_polls: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(300),
            max_polls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the identity asserted by the upstream auth proxy.
    pub identity_header: String,
}

/// Top-level Restora configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoraConfig {
    /// HTTP server port.
    pub port: u16,
    pub runner: RunnerConfig,
    pub model: ModelConfig,
    /// `None` disables rate limiting entirely.
    pub rate_limit: Option<RateLimitConfig>,
    pub polling: PollingConfig,
    pub auth: AuthConfig,
}

impl RestoraConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("REPLICATE_API_KEY")
            .ok_or_else(|| Error::Config("REPLICATE_API_KEY is not set".into()))?;

        let runner = RunnerConfig {
            base_url: var("REPLICATE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RUNNER_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            http_timeout: Duration::from_secs(parse_or(&var, "RUNNER_HTTP_TIMEOUT_SECS", 30u64)?),
        };

        let defaults = ModelConfig::default();
        let model = ModelConfig {
            version: var("REPLICATE_MODEL_VERSION").unwrap_or(defaults.version),
            style: var("RESTORE_STYLE").unwrap_or(defaults.style),
            prompt: var("RESTORE_PROMPT").unwrap_or(defaults.prompt),
            instant_id_strength: parse_or(
                &var,
                "RESTORE_INSTANT_ID_STRENGTH",
                defaults.instant_id_strength,
            )?,
        };

        let store = match (var("REDIS_URL"), var("RATE_LIMIT_STORE")) {
            (Some(url), _) => Some(StoreBackend::Redis { url }),
            (None, Some(kind)) if kind.eq_ignore_ascii_case("memory") => Some(StoreBackend::Memory),
            (None, Some(kind)) if kind.eq_ignore_ascii_case("none") => None,
            (None, Some(kind)) => {
                return Err(Error::Config(format!(
                    "RATE_LIMIT_STORE must be 'memory' or 'none', got '{}'",
                    kind
                )))
            }
            (None, None) => None,
        };

        let rate_limit = match store {
            Some(store) => {
                let requests = parse_or(&var, "RATE_LIMIT_REQUESTS", DEFAULT_RATE_LIMIT_REQUESTS)?;
                let window_secs =
                    parse_or(&var, "RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS)?;
                if requests == 0 {
                    return Err(Error::Config("RATE_LIMIT_REQUESTS must be at least 1".into()));
                }
                if window_secs == 0 {
                    return Err(Error::Config("RATE_LIMIT_WINDOW_SECS must be at least 1".into()));
                }
                Some(RateLimitConfig {
                    store,
                    requests,
                    window: Duration::from_secs(window_secs),
                    fail_open: parse_or(&var, "RATE_LIMIT_FAIL_OPEN", false)?,
                    key_prefix: var("RATE_LIMIT_KEY_PREFIX")
                        .unwrap_or_else(|| DEFAULT_RATE_LIMIT_KEY_PREFIX.into()),
                    support_contact: var("SUPPORT_CONTACT"),
                })
            }
            None => {
                info!("No rate limit store configured, rate limiting disabled");
                None
            }
        };

        let polling = PollingConfig {
            interval: Duration::from_millis(parse_or(&var, "JOB_POLL_INTERVAL_MS", 1000u64)?),
            deadline: Duration::from_secs(parse_or(&var, "JOB_DEADLINE_SECS", 300u64)?),
            max_polls: var("JOB_MAX_POLLS")
                .map(|v| parse_value::<u32>("JOB_MAX_POLLS", &v))
                .transpose()?,
        };
        if polling.deadline.is_zero() {
            return Err(Error::Config("JOB_DEADLINE_SECS must be at least 1".into()));
        }

        let auth = AuthConfig {
            identity_header: var("AUTH_IDENTITY_HEADER")
                .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.into())
                .to_ascii_lowercase(),
        };

        Ok(Self {
            port: parse_or(&var, "PORT", DEFAULT_PORT)?,
            runner,
            model,
            rate_limit,
            polling,
            auth,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {}: '{}'", key, raw)))
}
