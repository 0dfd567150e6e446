//! Inference oracle collaborator.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::errors::InferenceError;
use crate::req::HttpClient;
use crate::types::{AgentKind, Observation};
use crate::Error;

/// Request body sent to the oracle.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub observation: Observation,
    pub context: Map<String, Value>,
}

/// Opaque policy oracle. Returns the raw response body; validation is the
/// gateway's job.
#[async_trait]
pub trait InferenceOracle: Send + Sync {
    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> &str;

    async fn infer(&self, kind: AgentKind, request: &InferenceRequest) -> Result<Value, InferenceError>;
}

/// Oracle reached over HTTP at `POST {base}/{kind}/infer`.
pub struct HttpOracle {
    http: HttpClient,
}

impl HttpOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(base_url, timeout)?,
        })
    }
}

fn route_for(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Traffic => "/traffic/infer",
        AgentKind::Rail => "/rail/infer",
    }
}

#[async_trait]
impl InferenceOracle for HttpOracle {
    fn endpoint(&self) -> &str {
        &self.http.base_url
    }

    async fn infer(&self, kind: AgentKind, request: &InferenceRequest) -> Result<Value, InferenceError> {
        let body = serde_json::to_string(request)
            .map_err(|e| InferenceError::InvalidResponse(format!("request encoding: {e}")))?;

        let text = self
            .http
            .post(route_for(kind), body, &[])
            .await
            .map_err(|e| match e.status_code() {
                Some(status) => InferenceError::Unreachable(format!("oracle status {status}")),
                None => InferenceError::Unreachable(e.to_string()),
            })?;

        serde_json::from_str(&text)
            .map_err(|e| InferenceError::InvalidResponse(format!("body is not JSON: {e}")))
    }
}
