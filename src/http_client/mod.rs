//! Network primitive used by the API orchestrator.
//!
//! The orchestrator only ever talks to a [`Transport`]. Production code uses
//! [`ReqwestTransport`]; tests substitute a scripted implementation so the
//! cache and rate-limit paths can be exercised without a network.

mod response;

pub use response::{is_success_status, ApiRequest, ApiResponse};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

/// Default user agent; GitHub rejects requests without one.
pub const USER_AGENT: &str = concat!("ghlink/", env!("CARGO_PKG_VERSION"));

/// Errors raised before a response was received.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Request to {url} timed out")]
    Timeout { url: String },
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },
}

/// Performs a single HTTP exchange.
///
/// Implementations must return `Ok` for every response that was received,
/// including 4xx and 5xx statuses; `Err` is reserved for failures where no
/// response exists.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

fn extract_response_headers(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        Self::with_user_agent(timeout, USER_AGENT)
    }

    /// Create a transport with a custom user agent.
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn map_error(url: &str, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else {
            TransportError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = extract_response_headers(&response);
        let text = response
            .text()
            .await
            .map_err(|e| Self::map_error(&request.url, e))?;

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(ApiResponse::from_parts(status, headers, text))
    }
}
