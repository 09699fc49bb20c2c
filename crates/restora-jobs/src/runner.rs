//! Job runner port.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{JobHandle, JobRequest, PollResult};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RunnerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RunnerError::InvalidResponse(err.to_string())
        } else {
            RunnerError::Request(err.to_string())
        }
    }
}

/// External asynchronous job service.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Start a job. Called at most once per orchestrated run.
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, RunnerError>;

    /// Read the job's current status. Must have no side effects.
    async fn poll(&self, handle: &JobHandle) -> Result<PollResult, RunnerError>;

    /// Ask the runner to stop a job. Runners without cancellation do nothing.
    async fn cancel(&self, _handle: &JobHandle) -> Result<(), RunnerError> {
        Ok(())
    }
}
