//! Job types.

use std::fmt;

use restora_core::ModelConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid job request: {0}")]
pub struct InvalidRequest(pub String);

/// Payload for one external job. Built once, submitted once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest {
    version: String,
    input: serde_json::Value,
}

impl JobRequest {
    /// Build a job from a model version and an input object.
    pub fn new(version: impl Into<String>, input: serde_json::Value) -> Result<Self, InvalidRequest> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(InvalidRequest("model version is empty".into()));
        }
        if !input.is_object() {
            return Err(InvalidRequest("input must be a JSON object".into()));
        }
        Ok(Self { version, input })
    }

    /// Build an image restoration job for `image_url` with the configured model parameters.
    pub fn restore(image_url: &str, model: &ModelConfig) -> Result<Self, InvalidRequest> {
        let url = Url::parse(image_url.trim())
            .map_err(|e| InvalidRequest(format!("image URL '{}': {}", image_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InvalidRequest(format!(
                "image URL must be http or https, got '{}'",
                url.scheme()
            )));
        }

        Self::new(
            model.version.clone(),
            json!({
                "image": url.as_str(),
                "style": model.style,
                "prompt": model.prompt,
                "instant_id_strength": model.instant_id_strength,
            }),
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn input(&self) -> &serde_json::Value {
        &self.input
    }
}

/// Reference to a submitted job, used for every subsequent status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Runner-assigned job id.
    pub id: String,
    pub status_url: String,
    /// Present when the runner supports cancellation.
    pub cancel_url: Option<String>,
}

/// Runner-reported job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Result of a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub status: JobStatus,
    /// Result references; empty until the job succeeds.
    pub output: Vec<String>,
    pub error: Option<String>,
}

impl PollResult {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Processing,
            output: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(output: Vec<String>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            output,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            output: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Why a run ended without output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The runner was unreachable or rejected the payload.
    Submission(String),
    /// The runner reported the job as failed or canceled.
    Job(String),
    /// A status check could not be completed or understood.
    Status(String),
}

impl JobFailure {
    pub fn reason(&self) -> &str {
        match self {
            Self::Submission(r) | Self::Job(r) | Self::Status(r) => r,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission(r) => write!(f, "submission failed: {}", r),
            Self::Job(r) => write!(f, "job failed: {}", r),
            Self::Status(r) => write!(f, "status check failed: {}", r),
        }
    }
}

/// Terminal result of one orchestrated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded(Vec<String>),
    Failed(JobFailure),
    /// The deadline or poll budget ran out while the job was still pending.
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_payload() {
        let model = ModelConfig::default();
        let request = JobRequest::restore("https://cdn.example.com/face.png", &model).unwrap();
        assert_eq!(request.version(), model.version);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["version"], model.version.as_str());
        assert_eq!(body["input"]["image"], "https://cdn.example.com/face.png");
        assert_eq!(body["input"]["style"], "Clay");
        assert_eq!(body["input"]["instant_id_strength"], 0.8);
    }

    #[test]
    fn test_restore_rejects_bad_urls() {
        let model = ModelConfig::default();
        assert!(JobRequest::restore("", &model).is_err());
        assert!(JobRequest::restore("not a url", &model).is_err());
        assert!(JobRequest::restore("file:///etc/passwd", &model).is_err());
    }

    #[test]
    fn test_new_validates() {
        assert!(JobRequest::new("", json!({})).is_err());
        assert!(JobRequest::new("v1", json!("image")).is_err());
        assert!(JobRequest::new("v1", json!({"image": "x"})).is_ok());
    }

    #[test]
    fn test_status_wire_format() {
        let status: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, JobStatus::Processing);
        assert!(!status.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert_eq!(JobStatus::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn test_failure_reason() {
        let failure = JobFailure::Job("model error".into());
        assert_eq!(failure.reason(), "model error");
        assert_eq!(failure.to_string(), "job failed: model error");
    }
}
