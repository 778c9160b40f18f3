//! GitHub API error types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http_client::{ApiResponse, TransportError};
use crate::queue::QueueError;

const TOKEN_HINT: &str =
    " Consider adding an authentication token for a significantly higher rate limit.";

/// Message shown when the rate limit is exhausted.
pub fn rate_limit_message(reset_at: &DateTime<Utc>, authenticated: &bool) -> String {
    let mut message = format!(
        "GitHub rate limit exceeded. No more requests will be made until after {}.",
        reset_at.with_timezone(&chrono::Local).format("%H:%M:%S")
    );
    if !*authenticated {
        message.push_str(TOKEN_HINT);
    }
    message
}

/// A failed exchange with GitHub.
///
/// `status` and `headers` are present whenever a response was actually
/// received, so callers can tell "not found" apart from a broken network.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub message: String,
}

impl RequestError {
    /// Error for a response with an unusable status.
    pub fn from_response(url: &str, response: &ApiResponse) -> Self {
        let detail = response
            .json
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| format!(": {}", m))
            .unwrap_or_default();
        Self {
            status: Some(response.status),
            headers: response
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            message: format!("GitHub returned {} for {}{}", response.status, url, detail),
        }
    }

    /// Error for a body that did not match the expected shape.
    pub fn decode(url: &str, status: u16, err: serde_json::Error) -> Self {
        Self {
            status: Some(status),
            headers: BTreeMap::new(),
            message: format!("Unexpected response body from {}: {}", url, err),
        }
    }

    /// Error for a URL that could not be built.
    pub fn invalid_url(url: &str, err: url::ParseError) -> Self {
        Self {
            status: None,
            headers: BTreeMap::new(),
            message: format!("Invalid request URL {}: {}", url, err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        Self {
            status: None,
            headers: BTreeMap::new(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{}", rate_limit_message(.reset_at, .authenticated))]
    RateLimited {
        reset_at: DateTime<Utc>,
        authenticated: bool,
    },
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ApiError {
    /// HTTP status of the failed exchange, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Request(e) => e.status,
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Request(err.into())
    }
}
