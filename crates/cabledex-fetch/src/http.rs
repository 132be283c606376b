//! Shared HTTP client with timeout and retry policy.

use crate::redact::redact_error_message;
use cabledex_core::FetchError;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connect timeout for all requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry attempts for 5xx and network failures. 4xx responses are surfaced
/// immediately; the workflow item loop owns retrying those.
const MAX_RETRIES: u32 = 2;

/// Initial backoff between retries (doubles per attempt).
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Shared HTTP client for all outbound traffic.
///
/// Configured once and cloned cheaply; connection pooling and TLS come from
/// the underlying reqwest client.
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Transport` if the underlying client cannot be
    /// constructed.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_request_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Transport` if the underlying client cannot be
    /// constructed.
    pub fn with_request_timeout(request_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .use_rustls_tls()
            .build()
            .map_err(|e| FetchError::Transport {
                service: "http".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client: Arc::new(client),
            request_timeout,
        })
    }

    /// Borrow the inner reqwest client to build requests.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute a request, retrying 5xx responses and network failures with
    /// exponential backoff (1s, 2s). 4xx responses map to
    /// [`FetchError::Status`] without retry.
    ///
    /// # Errors
    ///
    /// `FetchError::Status` for any non-2xx after retries are exhausted,
    /// `FetchError::Transport` for network-level failures.
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        service: &str,
    ) -> Result<Response, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| FetchError::Transport {
                    service: service.to_string(),
                    message: "failed to clone request for retry".to_string(),
                })?
                .timeout(self.request_timeout)
                .build()
                .map_err(|e| FetchError::Transport {
                    service: service.to_string(),
                    message: format!("failed to build request: {e}"),
                })?;

            let url = request.url().to_string();
            debug!(service, attempt, url = %url, "executing HTTP request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(FetchError::Status {
                            service: service.to_string(),
                            status: status.as_u16(),
                            url,
                        });
                    }

                    if status.is_server_error() {
                        if attempt <= MAX_RETRIES {
                            warn!(
                                service,
                                attempt,
                                status = status.as_u16(),
                                "server error, will retry"
                            );
                            tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                            continue;
                        }
                        return Err(FetchError::Status {
                            service: service.to_string(),
                            status: status.as_u16(),
                            url,
                        });
                    }

                    return Ok(response);
                }
                Err(e) => {
                    let message = redact_error_message(&e.to_string());

                    if attempt <= MAX_RETRIES {
                        warn!(service, attempt, error = %message, "network error, will retry");
                        tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                        continue;
                    }

                    return Err(FetchError::Transport {
                        service: service.to_string(),
                        message,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn client_construction_succeeds() {
        assert!(HttpClient::new().is_ok());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap();
        let builder = http.inner().get(format!("{}/missing", server.uri()));
        let err = http.execute_with_retry(builder, "test").await.unwrap_err();

        match err {
            FetchError::Status { status, .. } => assert_eq!(status, 404),
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let http = HttpClient::new().unwrap();
        let builder = http.inner().get(format!("{}/flaky", server.uri()));
        let response = http.execute_with_retry(builder, "test").await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }
}
