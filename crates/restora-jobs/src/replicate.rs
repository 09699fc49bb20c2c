//! Replicate predictions API adapter.
//!
//! `POST /v1/predictions` starts a prediction and returns its `urls.get`
//! status endpoint, which is then fetched until the prediction settles.

use async_trait::async_trait;
use reqwest::{Client, Response};
use restora_core::RunnerConfig;
use serde::Deserialize;
use tracing::{debug, error};

use crate::runner::{JobRunner, RunnerError};
use crate::types::{JobHandle, JobRequest, JobStatus, PollResult};

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: JobStatus,
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    error: serde_json::Value,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
    cancel: Option<String>,
}

/// [`JobRunner`] backed by Replicate.
#[derive(Debug, Clone)]
pub struct ReplicateRunner {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ReplicateRunner {
    pub fn new(config: &RunnerConfig) -> Result<Self, RunnerError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| RunnerError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.api_key)
    }

    fn prediction_url(&self, id: &str) -> String {
        format!("{}/v1/predictions/{}", self.base_url, id)
    }

    async fn read_prediction(response: Response) -> Result<Prediction, RunnerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Replicate API error {}: {}", status, body);
            return Err(RunnerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Prediction>().await?)
    }
}

#[async_trait]
impl JobRunner for ReplicateRunner {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, RunnerError> {
        let url = format!("{}/v1/predictions", self.base_url);
        debug!("Submitting prediction to {} with version {}", url, request.version());

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let prediction = Self::read_prediction(response).await?;
        if prediction.id.is_empty() {
            return Err(RunnerError::InvalidResponse("prediction has no id".into()));
        }

        let (get, cancel) = match prediction.urls {
            Some(urls) => (urls.get, urls.cancel),
            None => (None, None),
        };

        Ok(JobHandle {
            status_url: get.unwrap_or_else(|| self.prediction_url(&prediction.id)),
            cancel_url: cancel,
            id: prediction.id,
        })
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollResult, RunnerError> {
        let response = self
            .client
            .get(&handle.status_url)
            .header("Authorization", self.authorization())
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let prediction = Self::read_prediction(response).await?;
        Ok(PollResult {
            status: prediction.status,
            output: output_urls(&prediction.output),
            error: error_text(&prediction.error),
        })
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), RunnerError> {
        let url = handle
            .cancel_url
            .clone()
            .unwrap_or_else(|| format!("{}/cancel", self.prediction_url(&handle.id)));

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RunnerError::Api { status, body });
        }
        Ok(())
    }
}

/// Predictions return either a single URL or a list of them.
fn output_urls(output: &serde_json::Value) -> Vec<String> {
    match output {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        other => vec![other.to_string()],
    }
}

fn error_text(error: &serde_json::Value) -> Option<String> {
    match error {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
