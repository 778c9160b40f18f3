//! Request and response shapes exchanged with the transport.

use std::collections::{BTreeMap, HashMap};

use reqwest::Method;
use serde_json::Value;

/// An outbound API request.
///
/// Header names are stored lowercased so lookups and cache identities do not
/// depend on the casing or insertion order a caller used.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl ApiRequest {
    /// Create a GET request for a URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Set (or replace) a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style variant of [`ApiRequest::set_header`].
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// A response as returned by the network primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    /// Raw body text.
    pub text: String,
    /// Decoded JSON body, `Value::Null` if the body was empty or not JSON.
    pub json: Value,
}

impl ApiResponse {
    /// Build a response from raw parts, decoding the body as JSON when possible.
    pub fn from_parts(status: u16, headers: HashMap<String, String>, text: String) -> Self {
        let json = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            status,
            headers,
            text,
            json,
        }
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Check if the response is 304 Not Modified.
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// Check if the status is in the cacheable success range.
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// Get the ETag header.
    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    /// Get the Last-Modified header.
    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    /// Get the Link header used for pagination.
    pub fn link(&self) -> Option<&str> {
        self.header("link")
    }
}

/// Success range accepted by the response cache (200..=208).
pub fn is_success_status(status: u16) -> bool {
    (200..=208).contains(&status)
}
