//! Shared utility functions for the Netvend application.

use std::future::Future;
use std::time::Duration;

use axum::http::HeaderMap;

/// Bounded retry with linear backoff.
///
/// The payment flow retries transient gateway failures a fixed number of
/// times with a growing delay (`backoff * attempt`). Non-retryable errors
/// and exhausted budgets are returned to the caller unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        assert!(max_attempts > 0, "retry policy needs at least one attempt");
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget
    /// is spent. Returns the final result and the number of attempts made.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        retryable: impl Fn(&E) -> bool,
    ) -> (std::result::Result<T, E>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) => {
                    if attempt >= self.max_attempts || !retryable(&e) {
                        return (Err(e), attempt);
                    }
                    // Linear backoff: 1x, 2x, 3x the base delay.
                    tokio::time::sleep(self.backoff * attempt).await;
                }
            }
        }
    }
}

/// Append query parameters to a URL, percent-encoding the values.
pub fn append_query_params(base_url: &str, params: &[(&str, &str)]) -> String {
    let query_string: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    if base_url.contains('?') {
        format!("{}&{}", base_url, query_string)
    } else {
        format!("{}?{}", base_url, query_string)
    }
}

/// Extract a bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
