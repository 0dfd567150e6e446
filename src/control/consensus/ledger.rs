//! Consensus ledger collaborator: an append-only, externally ordered message
//! log addressed by topic.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::control::config::ConsensusConfig;
use crate::errors::LedgerError;
use crate::req::HttpClient;
use crate::Error;

/// Ledger confirmation for a submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub sequence_number: Option<String>,
    pub consensus_timestamp: Option<String>,
}

#[async_trait]
pub trait ConsensusLedger: Send + Sync {
    /// Create a topic and return its identifier.
    async fn create_topic(&self, memo: &str) -> Result<String, LedgerError>;

    /// Submit an opaque message; resolves once the ledger has ordered it.
    async fn submit_message(&self, topic_id: &str, message: &[u8]) -> Result<Receipt, LedgerError>;
}

fn ledger_error(e: Error) -> LedgerError {
    match e {
        Error::ClientRequest {
            status_code: status @ (401 | 403),
            error_message,
        } => LedgerError::Credentials(format!("status {status}: {error_message}")),
        Error::ClientRequest {
            status_code,
            error_message,
        }
        | Error::ServerRequest {
            status_code,
            error_message,
        } => LedgerError::Rejected {
            status: status_code,
            message: error_message,
        },
        other => LedgerError::Transport(other.to_string()),
    }
}

/// Sequence numbers and timestamps arrive as strings or numbers.
fn scalar_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicResponse {
    topic_id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    sequence_number: Option<Value>,
    consensus_timestamp: Option<Value>,
}

/// Ledger reached through an HTTP bridge holding the operator account.
///
/// - `POST {base}/topics {memo}` -> `{topicId}`
/// - `POST {base}/topics/{id}/messages {message}` -> `{sequenceNumber, consensusTimestamp}`
pub struct HttpLedger {
    http: HttpClient,
    operator_id: String,
    operator_key: String,
}

impl HttpLedger {
    pub fn new(
        base_url: impl Into<String>,
        operator_id: impl Into<String>,
        operator_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(base_url, timeout)?,
            operator_id: operator_id.into(),
            operator_key: operator_key.into(),
        })
    }

    /// Build from config; `None` when credentials are incomplete.
    pub fn from_config(config: &ConsensusConfig) -> Result<Option<Self>, Error> {
        match (&config.ledger_url, &config.operator_id, &config.operator_key) {
            (Some(url), Some(id), Some(key)) if config.has_credentials() => Ok(Some(Self::new(
                url.as_str(),
                id.as_str(),
                key.as_str(),
                Duration::from_millis(config.request_timeout_ms),
            )?)),
            _ => Ok(None),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<String, LedgerError> {
        let headers = [
            ("X-Operator-Id", self.operator_id.as_str()),
            ("X-Operator-Key", self.operator_key.as_str()),
        ];
        self.http
            .post(path, body.to_string(), &headers)
            .await
            .map_err(ledger_error)
    }
}

#[async_trait]
impl ConsensusLedger for HttpLedger {
    async fn create_topic(&self, memo: &str) -> Result<String, LedgerError> {
        let text = self.post("/topics", json!({ "memo": memo })).await?;
        let response: TopicResponse =
            serde_json::from_str(&text).map_err(|e| LedgerError::Parse(e.to_string()))?;
        scalar_text(response.topic_id).ok_or_else(|| LedgerError::Parse("missing topicId".into()))
    }

    async fn submit_message(&self, topic_id: &str, message: &[u8]) -> Result<Receipt, LedgerError> {
        let message = String::from_utf8_lossy(message);
        let text = self
            .post(&format!("/topics/{topic_id}/messages"), json!({ "message": message }))
            .await?;
        let response: SubmitResponse =
            serde_json::from_str(&text).map_err(|e| LedgerError::Parse(e.to_string()))?;
        Ok(Receipt {
            sequence_number: scalar_text(response.sequence_number),
            consensus_timestamp: scalar_text(response.consensus_timestamp),
        })
    }
}

/// In-process ledger with a configurable confirmation delay and failure
/// injection.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    delay: Duration,
    fail_remaining: AtomicU32,
    topics_created: AtomicU64,
    messages: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every submission confirmation by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` submissions with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    pub fn topics_created(&self) -> u64 {
        self.topics_created.load(Ordering::SeqCst)
    }

    /// Messages submitted to `topic_id`, in ledger order.
    pub fn messages(&self, topic_id: &str) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConsensusLedger for MemoryLedger {
    async fn create_topic(&self, _memo: &str) -> Result<String, LedgerError> {
        let n = self.topics_created.fetch_add(1, Ordering::SeqCst) + 1;
        let topic_id = format!("0.0.{}", 1000 + n);
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic_id.clone())
            .or_default();
        Ok(topic_id)
    }

    async fn submit_message(&self, topic_id: &str, message: &[u8]) -> Result<Receipt, LedgerError> {
        let injected = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LedgerError::Transport("injected failure".into()));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let sequence = {
            let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
            let topic = messages.entry(topic_id.to_string()).or_default();
            topic.push(message.to_vec());
            topic.len()
        };
        Ok(Receipt {
            sequence_number: Some(sequence.to_string()),
            consensus_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        })
    }
}
