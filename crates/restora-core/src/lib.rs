//! Restora core: configuration and shared error types.

pub mod config;
pub mod error;

pub use config::{
    AuthConfig, ModelConfig, PollingConfig, RateLimitConfig, RestoraConfig, RunnerConfig,
    StoreBackend,
};
pub use error::{Error, Result};
