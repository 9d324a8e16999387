//! Retry with exponential backoff for service requests.

use crate::error::{CloudError, Result};
use std::time::Duration;

/// Delay before retry `attempt` (1-based): 500 ms, 1 s, 2 s, ...
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16)))
}

/// Send the request built by `build`, retrying transient failures.
///
/// Network errors and 5xx responses are retried up to `max_retries` times;
/// 4xx responses fail immediately. Non-success responses become
/// [`CloudError::Status`].
pub(crate) async fn send_with_retry<F>(build: F, max_retries: u32, what: &str) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!("{}: retry {} after {:?}", what, attempt, delay);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(r) if r.status().is_success() => return Ok(r),
            Ok(r) => {
                let status = r.status();
                let body = r.text().await.unwrap_or_default();
                last_err = Some(CloudError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(500).collect(),
                });
                // Don't retry client errors (4xx)
                if status.is_client_error() {
                    break;
                }
            }
            Err(e) => {
                last_err = Some(CloudError::Network(format!("{} request failed: {e}", what)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CloudError::Network(format!("{} failed", what))))
}
