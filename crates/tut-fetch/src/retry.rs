//! Retrying GET with exponential backoff and rate-limit detection.

use std::time::Duration;

use rand::RngExt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::transport::{HttpResponse, Transport};

/// Provider error reasons that signal a retryable quota rejection.
const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Largest backoff exponent; keeps long retry chains from sleeping for hours.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Backoff schedule for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub retries: u32,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    /// Sleep before retry number `attempt` (1-based): `2^attempt s` plus up
    /// to one second of jitter.
    pub fn delay(attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let jitter: f64 = rand::rng().random::<f64>();
        Duration::from_secs(1 << exponent) + Duration::from_secs_f64(jitter)
    }
}

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
}

/// Whether a response body carries a provider rate-limit reason.
///
/// Bodies that are not a provider error envelope are never rate limits.
pub fn is_rate_limited(body: &[u8]) -> bool {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .map(|envelope| {
            envelope
                .error
                .errors
                .iter()
                .any(|e| RATE_LIMIT_REASONS.contains(&e.reason.as_str()))
        })
        .unwrap_or(false)
}

/// GET `url` until it answers 200, following `policy`.
///
/// Connection failures, 5xx responses and rate-limit envelopes are retried.
/// Any other status fails at once.
pub(crate) async fn get_with_retry(
    transport: &dyn Transport,
    url: &str,
    authorization: Option<&str>,
    policy: RetryPolicy,
) -> Result<HttpResponse, FetchError> {
    let mut last_error = String::new();

    for attempt in 0..=policy.retries {
        if attempt > 0 {
            let delay = RetryPolicy::delay(attempt);
            warn!(
                url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                reason = %last_error,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
        }

        let response = match transport.get(url, authorization).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, attempt, error = %e, "Request failed before a response");
                last_error = e.to_string();
                continue;
            }
        };

        if response.status == 200 {
            return Ok(response);
        }

        let rate_limited = is_rate_limited(&response.body);
        if !rate_limited && response.status < 500 {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: response.status,
                body: response.body_text(),
            });
        }
        last_error = if rate_limited {
            format!("{} rate limited", response.status)
        } else {
            format!("{} server error", response.status)
        };
    }

    Err(FetchError::Exhausted {
        url: url.to_owned(),
        retries: policy.retries,
        last_error,
    })
}
