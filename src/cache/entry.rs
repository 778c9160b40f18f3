//! Persisted cache entry.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CacheError, RequestIdentity};
use crate::http_client::{is_success_status, ApiRequest, ApiResponse};

/// Response headers worth keeping in the cache. Everything else (rate limit
/// counters, request ids, cookies) is dropped before persisting.
pub const SANITIZED_HEADERS: &[&str] = &["content-type", "etag", "last-modified", "link"];

fn is_get(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET")
}

fn default_method() -> String {
    "GET".to_string()
}

/// Enough of the original request to reissue it conditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRequest {
    #[serde(default = "default_method", skip_serializing_if = "is_get")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
}

impl CachedRequest {
    pub fn identity(&self) -> RequestIdentity {
        let method = Method::from_bytes(self.method.as_bytes()).unwrap_or(Method::GET);
        RequestIdentity::new(&method, &self.url)
    }
}

/// Slimmed response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub json: Value,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl CachedResponse {
    /// Snapshot a response, keeping only [`SANITIZED_HEADERS`].
    pub fn from_response(response: &ApiResponse) -> Self {
        let headers = SANITIZED_HEADERS
            .iter()
            .filter_map(|name| response.header(name).map(|v| (name.to_string(), v.to_string())))
            .collect();
        Self {
            json: response.json.clone(),
            status: response.status,
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// A cached response with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub request: CachedRequest,
    pub response: CachedResponse,
    /// Milliseconds since the Unix epoch.
    pub retrieved: i64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheEntry {
    /// Snapshot a successful response.
    pub fn new(request: &ApiRequest, response: &ApiResponse, retrieved: i64) -> Self {
        Self {
            request: CachedRequest {
                method: request.method.to_string(),
                url: request.url.clone(),
                body: request.body.clone(),
            },
            response: CachedResponse::from_response(response),
            retrieved,
            etag: response.etag().map(str::to_string),
            last_modified: response.last_modified().map(str::to_string),
        }
    }

    /// When the body was last confirmed by the server.
    pub fn retrieved_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.retrieved)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Serialized form used for persistence.
    pub fn to_json_string(&self) -> Result<String, CacheError> {
        serde_json::to_string(self).map_err(|e| CacheError::Serialize(e.to_string()))
    }

    /// Parse and validate a persisted entry.
    pub fn from_json_str(raw: &str) -> Result<Self, CacheError> {
        let entry: CacheEntry =
            serde_json::from_str(raw).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if !is_success_status(entry.response.status) {
            return Err(CacheError::Corrupt(format!(
                "stored status {} is not cacheable",
                entry.response.status
            )));
        }
        if entry.request.url.is_empty() {
            return Err(CacheError::Corrupt("entry has no request url".to_string()));
        }
        Ok(entry)
    }
}
