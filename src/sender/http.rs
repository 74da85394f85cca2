use super::compression::Payload;
use crate::auth::SecretToken;
use reqwest::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT,
};
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

const X_ORIGINAL_SIZE: &str = "x-original-size";
const X_BATCH_SIZE: &str = "x-batch-size";

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: {status}")]
    HttpStatus { status: u16 },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
pub struct SenderStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl SenderStats {
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SenderStatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time.load(Ordering::Relaxed);
        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        SenderStatsSnapshot {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

/// POSTs sanitized JSON to the collector.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    endpoint: Url,
    request_timeout: Duration,
    user_agent: HeaderValue,
    stats: Arc<SenderStats>,
}

impl HttpSender {
    pub fn new(endpoint: Url, request_timeout: Duration, user_agent: &str) -> Result<Self, SendError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|_| SendError::InvalidHeader("user-agent"))?;

        let client = ClientBuilder::new()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                SendError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            request_timeout,
            user_agent,
            stats: Arc::new(SenderStats::default()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn stats(&self) -> SenderStatsSnapshot {
        self.stats.snapshot()
    }

    /// Sends one request. A non-2xx answer is an error.
    ///
    /// `batch_size` is set for JSON array bodies and becomes `X-Batch-Size`.
    pub async fn send(
        &self,
        payload: &Payload,
        authorization: Option<&SecretToken>,
        batch_size: Option<usize>,
    ) -> Result<(), SendError> {
        let headers = self.build_headers(payload, authorization, batch_size)?;
        let start = Instant::now();

        let request = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(payload.body.clone())
            .send();

        let outcome = match timeout(self.request_timeout, request).await {
            Err(_) => Err(SendError::Timeout(self.request_timeout)),
            Ok(Err(e)) if e.is_timeout() => Err(SendError::Timeout(self.request_timeout)),
            Ok(Err(e)) => Err(SendError::Network(e.without_url())),
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(SendError::HttpStatus {
                status: response.status().as_u16(),
            }),
        };

        let latency = start.elapsed();
        self.stats.record_request(outcome.is_ok(), latency);
        debug!(
            "POST {} bytes (batch: {:?}, encoding: {:?}) in {:?}: {}",
            payload.body.len(),
            batch_size,
            payload.encoding,
            latency,
            if outcome.is_ok() { "ok" } else { "failed" }
        );
        outcome
    }

    pub fn build_headers(
        &self,
        payload: &Payload,
        authorization: Option<&SecretToken>,
        batch_size: Option<usize>,
    ) -> Result<HeaderMap, SendError> {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, self.user_agent.clone());

        if let Some(token) = authorization {
            let mut value = HeaderValue::from_str(token.expose())
                .map_err(|_| SendError::InvalidHeader("authorization"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(format) = payload.encoding {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(format.as_str()));
            headers.insert(X_ORIGINAL_SIZE, HeaderValue::from(payload.original_size));
        }

        if let Some(size) = batch_size {
            headers.insert(X_BATCH_SIZE, HeaderValue::from(size));
        }

        Ok(headers)
    }
}
