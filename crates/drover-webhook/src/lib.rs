//! Webhook delivery with a bounded retry budget.
//!
//! Posts a JSON payload to a configured endpoint and retries transport
//! failures and retryable statuses with exponential backoff, up to a fixed
//! attempt count. On exhaustion it fails hard back to the caller; there is
//! no queueing or persistence here.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

/// Default total attempt budget (initial attempt included).
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Errors from webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint rejected the payload with a non-retryable status.
    #[error("endpoint rejected delivery: {status}")]
    Rejected { status: StatusCode },

    /// The retry budget ran out.
    #[error("delivery failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<WebhookError>,
    },
}

/// Delivers payloads to a single configured endpoint.
pub struct WebhookClient {
    http: Client,
    endpoint: String,
    max_attempts: u32,
}

impl WebhookClient {
    /// Create a client for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            endpoint: endpoint.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the total attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Whether a delivery failure is worth retrying.
    fn is_retryable(err: &WebhookError) -> bool {
        match err {
            WebhookError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            WebhookError::Rejected { status } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            WebhookError::RetriesExhausted { .. } => false,
        }
    }

    async fn attempt(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.http.post(&self.endpoint).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Rejected { status })
        }
    }

    /// POST `payload` to the endpoint, retrying up to the attempt budget.
    pub async fn deliver(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None, // Bounded by attempt count instead.
            ..Default::default()
        };

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.attempt(payload).await {
                Ok(()) => {
                    debug!(endpoint = %self.endpoint, attempt, "webhook delivered");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts && Self::is_retryable(&e) => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    last_error = Some(e);
                }
                Err(e) if Self::is_retryable(&e) => {
                    return Err(WebhookError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // Unreachable with max_attempts >= 1; kept for completeness.
        Err(WebhookError::RetriesExhausted {
            attempts: self.max_attempts,
            last: Box::new(last_error.unwrap_or(WebhookError::Rejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> serde_json::Value {
        json!({ "email": "user@example.com", "name": "Test User" })
    }

    #[tokio::test]
    async fn delivers_on_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhooks/users"))
            .and(body_json(payload()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebhookClient::new(format!("{}/webhooks/users", server.uri()));
        client.deliver(&payload()).await.unwrap();
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhooks/users"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhooks/users"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client =
            WebhookClient::new(format!("{}/webhooks/users", server.uri())).with_max_attempts(5);
        client.deliver(&payload()).await.unwrap();
    }

    #[tokio::test]
    async fn exhausts_budget_with_exact_attempt_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhooks/users"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client =
            WebhookClient::new(format!("{}/webhooks/users", server.uri())).with_max_attempts(3);
        let err = client.deliver(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::RetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhooks/users"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            WebhookClient::new(format!("{}/webhooks/users", server.uri())).with_max_attempts(5);
        let err = client.deliver(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Rejected {
                status: StatusCode::BAD_REQUEST
            }
        ));
    }
}
