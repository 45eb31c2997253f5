//! Shared retry policy for connector HTTP calls (§5).
//!
//! `401`/`403` never retry, `404` is data not failure, `5xx` and network
//! errors retry with exponential back-off capped at 5 attempts.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::warn;

use crate::error::{Result, TcmError};

pub const MAX_ATTEMPTS: u32 = 5;

fn backoff_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        max_interval: Duration::from_secs(10),
        multiplier: 2.0,
        max_elapsed_time: Some(Duration::from_secs(60)),
        ..Default::default()
    }
}

pub async fn retry_with_backoff<T, F, Fut>(operation_name: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    let mut backoff = backoff_policy();

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempts < MAX_ATTEMPTS => {
                let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(1));
                warn!(operation = operation_name, attempt = attempts, error = %err, delay_ms = delay.as_millis() as u64, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Same retry rule expressed for the `is_err` branch of an HTTP status,
/// used when a connector needs to know whether to retry *before*
/// constructing a `TcmError` (e.g. it still holds the `reqwest::Response`).
pub fn should_retry_status(status: reqwest::StatusCode) -> bool {
    !matches!(status, reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN)
        && (status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff("test", || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(TcmError::transient("not yet"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_auth_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TcmError::AuthError("nope".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
