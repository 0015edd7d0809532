//! HTTP fetch utilities (bounded concurrency, retry with capped exponential backoff) used to
//! talk to the upstream summary API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "sentirank-fetch";

/// 429 is always retryable. Other server errors are retried only for idempotent methods.
pub fn should_retry_status(method: &Method, status: StatusCode) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status.is_server_error() && method.is_idempotent()
}

/// Connect failures are always retryable; timeouts and other transport errors only for
/// idempotent methods.
pub fn should_retry_error(method: &Method, err: &reqwest::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    method.is_idempotent() && (err.is_timeout() || err.is_request())
}

/// Capped exponential backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryBackoff {
    pub retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryBackoff {
    /// Delay before retry number `retry` (0-based): `initial_delay * 2^retry`, capped.
    pub fn delay(&self, retry: usize) -> Duration {
        let doublings = retry.min(31) as u32;
        self.initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_concurrency: usize,
    pub backoff: RetryBackoff,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_concurrency: 4,
            backoff: RetryBackoff::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream answered {status} for {url}")]
    Status { status: u16, url: String },
}

/// Shared client for the upstream summary API.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
    backoff: RetryBackoff,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        Ok(Self {
            client: builder.build().context("building upstream http client")?,
            limit: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            backoff: config.backoff,
        })
    }

    pub async fn get_bytes(&self, run_id: Uuid, url: &str) -> Result<FetchedResponse, FetchError> {
        self.send(run_id, Method::GET, url).await
    }

    /// POST with an empty body, used for upstream actions such as cache refresh.
    pub async fn post_empty(&self, run_id: Uuid, url: &str) -> Result<FetchedResponse, FetchError> {
        self.send(run_id, Method::POST, url).await
    }

    async fn send(&self, run_id: Uuid, method: Method, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, %method, url);
        self.send_with_retries(method, url).instrument(span).await
    }

    async fn send_with_retries(&self, method: Method, url: &str) -> Result<FetchedResponse, FetchError> {
        let _permit = self.limit.acquire().await.expect("semaphore not closed");
        let mut retry = 0usize;

        loop {
            let can_retry = retry < self.backoff.retries;
            match self.client.request(method.clone(), url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    let body = resp.bytes().await?.to_vec();
                    debug!(status = status.as_u16(), bytes = body.len(), "fetch succeeded");
                    return Ok(FetchedResponse {
                        status,
                        final_url,
                        body,
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    if !(can_retry && should_retry_status(&method, status)) {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: resp.url().to_string(),
                        });
                    }
                    warn!(status = status.as_u16(), retry, "upstream status; backing off");
                }
                Err(err) => {
                    if !(can_retry && should_retry_error(&method, &err)) {
                        return Err(FetchError::Transport(err));
                    }
                    warn!(error = %err, retry, "upstream request error; backing off");
                }
            }
            tokio::time::sleep(self.backoff.delay(retry)).await;
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn quick(retries: usize) -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig {
            backoff: RetryBackoff {
                retries,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..Default::default()
        })
        .unwrap()
    }

    /// Serves one canned response per accepted connection, in order.
    async fn canned_server(responses: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{addr}")
    }

    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const THROTTLED: &str =
        "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const OK_JSON: &str =
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n[]";

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let backoff = RetryBackoff {
            retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(350));
        assert_eq!(backoff.delay(64), Duration::from_millis(350));
    }

    #[test]
    fn server_errors_are_retried_only_for_idempotent_methods() {
        assert!(should_retry_status(&Method::GET, StatusCode::BAD_GATEWAY));
        assert!(!should_retry_status(&Method::POST, StatusCode::BAD_GATEWAY));
        assert!(should_retry_status(&Method::POST, StatusCode::TOO_MANY_REQUESTS));
        assert!(!should_retry_status(&Method::GET, StatusCode::NOT_FOUND));
        assert!(!should_retry_status(&Method::GET, StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn get_retries_through_a_transient_server_error() {
        let base = canned_server(vec![UNAVAILABLE, OK_JSON]).await;
        let resp = quick(2)
            .get_bytes(Uuid::new_v4(), &format!("{base}/top-mobiles"))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, b"[]");
    }

    #[tokio::test]
    async fn refresh_post_is_not_replayed_after_a_server_error() {
        let base = canned_server(vec![UNAVAILABLE, OK_JSON]).await;
        let err = quick(3)
            .post_empty(Uuid::new_v4(), &format!("{base}/refresh"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn throttled_post_is_retried() {
        let base = canned_server(vec![THROTTLED, OK_JSON]).await;
        let resp = quick(2)
            .post_empty(Uuid::new_v4(), &format!("{base}/refresh"))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn client_errors_surface_immediately() {
        let base = canned_server(vec![NOT_FOUND]).await;
        let err = quick(3)
            .get_bytes(Uuid::new_v4(), &format!("{base}/top-mobiles"))
            .await
            .unwrap_err();
        match err {
            FetchError::Status { status, url } => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/top-mobiles"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_report_last_status() {
        let base = canned_server(vec![UNAVAILABLE, UNAVAILABLE]).await;
        let err = quick(1)
            .get_bytes(Uuid::new_v4(), &format!("{base}/top-mobiles"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }
}
