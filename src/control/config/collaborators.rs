//! Endpoints and timeouts for the external collaborators.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inference oracle routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Primary oracle base URL (None disables inference entirely)
    #[serde(default = "default_primary_url")]
    pub primary_url: Option<String>,
    /// Secondary oracle base URL, tried when the primary fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_url: Option<String>,
    /// Per-request timeout (ms)
    #[serde(default = "default_inference_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_primary_url() -> Option<String> {
    Some("http://localhost:8001".to_string())
}

fn default_inference_timeout_ms() -> u64 {
    5000
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            primary_url: default_primary_url(),
            secondary_url: None,
            timeout_ms: default_inference_timeout_ms(),
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Pre-provisioned topic identifiers per topic key.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConsensusTopics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<String>,
}

impl ConsensusTopics {
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "traffic" => self.traffic.as_deref(),
            "rail" => self.rail.as_deref(),
            "supervisor" => self.supervisor.as_deref(),
            _ => None,
        }
    }
}

/// Consensus ledger settings.
///
/// Anchoring is enabled only when a ledger URL and both operator credentials
/// are present. Credentials are normally supplied through the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsensusConfig {
    /// Ledger bridge base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_url: Option<String>,
    /// Operator account id (prefer LEDGER_OPERATOR_ID env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    /// Operator key (prefer LEDGER_OPERATOR_KEY env var)
    #[serde(default, skip_serializing)]
    pub operator_key: Option<String>,
    /// Max time to wait for a receipt before reporting pending (ms, 0 = never wait)
    #[serde(default = "default_wait_budget_ms")]
    pub wait_budget_ms: u64,
    /// Request timeout for ledger calls (ms)
    #[serde(default = "default_ledger_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Memo prefix used when creating topics lazily
    #[serde(default = "default_topic_memo_prefix")]
    pub topic_memo_prefix: String,
    #[serde(default)]
    pub topics: ConsensusTopics,
}

fn default_wait_budget_ms() -> u64 {
    1500
}

fn default_ledger_timeout_ms() -> u64 {
    10_000
}

fn default_topic_memo_prefix() -> String {
    "crossing-control".to_string()
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            ledger_url: None,
            operator_id: None,
            operator_key: None,
            wait_budget_ms: default_wait_budget_ms(),
            request_timeout_ms: default_ledger_timeout_ms(),
            topic_memo_prefix: default_topic_memo_prefix(),
            topics: ConsensusTopics::default(),
        }
    }
}

impl ConsensusConfig {
    pub fn has_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.ledger_url) && present(&self.operator_id) && present(&self.operator_key)
    }

    pub fn wait_budget(&self) -> Duration {
        Duration::from_millis(self.wait_budget_ms)
    }
}

/// Actuation endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActuationConfig {
    /// Controller bridge base URL (None logs outcomes without actuating)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_actuation_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries on 502/503/504 within the timeout
    #[serde(default = "default_actuation_retries")]
    pub max_retries: u32,
}

fn default_actuation_timeout_ms() -> u64 {
    2000
}

fn default_actuation_retries() -> u32 {
    2
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_actuation_timeout_ms(),
            max_retries: default_actuation_retries(),
        }
    }
}

impl ActuationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
