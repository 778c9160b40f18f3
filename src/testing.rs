//! Test doubles for the network layer.
//!
//! [`ScriptedTransport`] replays canned responses in order and records every
//! request it was handed, so tests can assert both what the orchestrator sent
//! and how many times it reached the network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::http_client::{ApiRequest, ApiResponse, Transport, TransportError};

/// In-memory [`Transport`] that answers from a script.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status, headers and raw body.
    pub fn push(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let headers: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push_response(ApiResponse::from_parts(status, headers, body.to_string()));
    }

    /// Queue a JSON response.
    pub fn push_json(&self, status: u16, headers: &[(&str, &str)], body: &Value) {
        self.push(status, headers, &body.to_string());
    }

    pub fn push_response(&self, response: ApiResponse) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response));
        }
    }

    /// Queue a failure where no response was received.
    pub fn push_error(&self, error: TransportError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    /// Number of requests sent so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<ApiRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| {
            Err(TransportError::Network {
                url: request.url.clone(),
                message: "no scripted response left".to_string(),
            })
        })
    }
}
