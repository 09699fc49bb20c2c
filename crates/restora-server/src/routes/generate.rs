//! Image restoration route: identity, quota check, then one orchestrated job.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use restora_jobs::{JobFailure, JobOutcome, JobRequest};
use restora_ratelimit::{RateLimitDecision, RateLimitError};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/generate", post(generate))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let Some(identity) = state.identity.resolve(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, HeaderMap::new(), "Login to upload.");
    };

    // Malformed input is rejected before the quota is touched.
    let job = match body {
        Ok(Json(req)) => match JobRequest::restore(&req.image_url, &state.config.model) {
            Ok(job) => job,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, HeaderMap::new(), &e.to_string())
            }
        },
        Err(rejection) => {
            return error_response(rejection.status(), HeaderMap::new(), &rejection.body_text())
        }
    };

    let mut response_headers = HeaderMap::new();

    if let Some(limiter) = &state.limiter {
        let decision = match limiter.check(identity.as_str()).await {
            Ok(decision) => decision,
            Err(RateLimitError::InvalidIdentity) => {
                return error_response(StatusCode::UNAUTHORIZED, HeaderMap::new(), "Login to upload.")
            }
            Err(RateLimitError::BackingStoreUnavailable(e)) => {
                error!("Rate limit check failed for {}: {}", identity, e);
                return error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    HeaderMap::new(),
                    "Service temporarily unavailable, please try again later.",
                );
            }
        };

        insert_rate_limit_headers(&mut response_headers, &decision);

        if !decision.allowed {
            return rate_limited(&state, response_headers, &decision, limiter.now());
        }
    }

    info!("Starting image restoration for {}", identity);

    match state.orchestrator.run(&job).await {
        JobOutcome::Succeeded(output) => {
            info!("Restored image for {}: {} output(s)", identity, output.len());
            (StatusCode::OK, response_headers, Json(output)).into_response()
        }
        JobOutcome::Failed(JobFailure::Job(reason)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            response_headers,
            Json(json!({
                "error": "Failed to restore image",
                "reason": reason,
            })),
        )
            .into_response(),
        JobOutcome::Failed(failure) => {
            error!("Image restoration for {} failed: {}", identity, failure);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                response_headers,
                "Failed to restore image",
            )
        }
        JobOutcome::TimedOut => {
            warn!("Image restoration for {} timed out", identity);
            error_response(
                StatusCode::GATEWAY_TIMEOUT,
                response_headers,
                "Image restoration timed out",
            )
        }
    }
}

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
}

fn rate_limited(
    state: &AppState,
    mut headers: HeaderMap,
    decision: &RateLimitDecision,
    now: DateTime<Utc>,
) -> Response {
    let retry_after = decision.retry_after(now);
    let contact = state
        .config
        .rate_limit
        .as_ref()
        .and_then(|rl| rl.support_contact.as_deref());

    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs(now)),
    );

    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Json(json!({
            "error": retry_after.message(contact),
            "limit": decision.limit,
            "remaining": decision.remaining,
            "resetAt": decision.reset_at,
            "retryAfter": retry_after,
        })),
    )
        .into_response()
}

fn error_response(status: StatusCode, headers: HeaderMap, message: &str) -> Response {
    (status, headers, Json(json!({ "error": message }))).into_response()
}
