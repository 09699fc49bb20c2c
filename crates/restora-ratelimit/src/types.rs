//! Rate limiting types.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::limiter::RateLimitError;

/// Opaque, non-empty key identifying a quota holder (e.g. a verified email).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap an identity. Whitespace-only input is rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self, RateLimitError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(RateLimitError::InvalidIdentity);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = RateLimitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Build a decision from the post-increment count of the current window.
    pub fn from_count(count: u64, limit: u32, reset_at_ms: u64) -> Self {
        let limit_wide = u64::from(limit);
        Self {
            allowed: count <= limit_wide,
            limit,
            remaining: limit_wide.saturating_sub(count) as u32,
            reset_at: millis_to_datetime(reset_at_ms),
        }
    }

    /// Time until the window resets, measured from `now`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> RetryAfter {
        let diff = (self.reset_at - now).num_milliseconds().max(0) as u64;
        RetryAfter::from_millis(diff)
    }

    /// Whole seconds until reset, rounded up, for a `Retry-After` header.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let diff = (self.reset_at - now).num_milliseconds().max(0) as u64;
        diff.div_ceil(1000)
    }
}

/// Remaining time until quota renewal, broken down for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryAfter {
    pub hours: u64,
    pub minutes: u64,
}

impl RetryAfter {
    pub fn from_millis(millis: u64) -> Self {
        let total_minutes = millis / 1000 / 60;
        let hours = total_minutes / 60;
        Self {
            hours,
            minutes: total_minutes - hours * 60,
        }
    }

    /// User-facing renewal message, optionally followed by a support contact.
    pub fn message(&self, support_contact: Option<&str>) -> String {
        let base = format!(
            "Your generations will renew in {} hours and {} minutes.",
            self.hours, self.minutes
        );
        match support_contact {
            Some(contact) => format!("{} Email {} if you have any questions.", base, contact),
            None => base,
        }
    }
}

pub(crate) fn millis_to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
