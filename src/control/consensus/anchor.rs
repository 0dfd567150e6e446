//! Anchoring of decision payloads into the consensus ledger.
//!
//! Topic resolution and submission run in one spawned task that outlives the
//! race against the wait budget. When the budget elapses first the caller gets
//! `Pending` and the task later delivers its result through a [`ReceiptSink`].
//! With a zero budget the caller never waits and every result goes through
//! the sink.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ConsensusLedger, Receipt};
use crate::control::config::{ConsensusConfig, ConsensusTopics};
use crate::control::infra::{targets, PipelineMetrics};
use crate::errors::LedgerError;
use crate::types::ConsensusRef;

/// Receives receipts that arrive after the wait budget.
pub trait ReceiptSink: Send + Sync {
    /// Compare-and-set: fill the reference only if the decision has none yet.
    fn apply_receipt(&self, id: Uuid, reference: ConsensusRef) -> bool;

    /// The late submission failed; the decision will never be anchored.
    fn abandon_receipt(&self, id: Uuid);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorOutcome {
    /// No ledger credentials configured
    Disabled,
    Confirmed(ConsensusRef),
    /// Budget elapsed; the receipt will be applied later. The topic id is
    /// `None` while the topic for this key is still being created.
    Pending { topic_id: Option<String> },
    /// Submission failed; carries the reason code
    Skipped(String),
}

impl AnchorOutcome {
    pub fn reference(&self) -> Option<&ConsensusRef> {
        match self {
            AnchorOutcome::Confirmed(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AnchorOutcome::Pending { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnchorOutcome::Disabled => "disabled",
            AnchorOutcome::Confirmed(_) => "confirmed",
            AnchorOutcome::Pending { .. } => "pending",
            AnchorOutcome::Skipped(_) => "skipped",
        }
    }
}

fn to_ref(topic_id: &str, receipt: Receipt) -> ConsensusRef {
    ConsensusRef {
        topic_id: topic_id.to_string(),
        sequence_number: receipt.sequence_number,
        consensus_timestamp: receipt.consensus_timestamp,
    }
}

/// Topic ids per key: configured ones, else created once per key.
struct TopicDirectory {
    configured: ConsensusTopics,
    memo_prefix: String,
    created: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl TopicDirectory {
    fn cell(&self, key: &str) -> Arc<OnceCell<String>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Topic id for `key` if already known, without waiting.
    fn known(&self, key: &str) -> Option<String> {
        if let Some(id) = self.configured.get(key) {
            return Some(id.to_string());
        }
        self.cell(key).get().cloned()
    }

    /// Concurrent first calls for one key create a single topic; other keys
    /// never wait on it. A failed creation leaves the cell empty for a later try.
    async fn resolve(&self, ledger: &dyn ConsensusLedger, key: &str) -> Result<String, LedgerError> {
        if let Some(id) = self.configured.get(key) {
            return Ok(id.to_string());
        }
        let cell = self.cell(key);
        let memo = format!("{}:{key}", self.memo_prefix);
        let id = cell
            .get_or_try_init(|| async move {
                let id = ledger.create_topic(&memo).await?;
                info!(target: targets::CONSENSUS, topic_key = key, topic_id = %id, "Created consensus topic");
                Ok::<_, LedgerError>(id)
            })
            .await?;
        Ok(id.clone())
    }
}

type Submission = Result<ConsensusRef, LedgerError>;

pub struct ConsensusAnchor {
    ledger: Option<Arc<dyn ConsensusLedger>>,
    topics: Arc<TopicDirectory>,
    wait_budget: Duration,
    sink: Option<Arc<dyn ReceiptSink>>,
    metrics: Option<PipelineMetrics>,
}

impl ConsensusAnchor {
    /// Anchor that reports `Disabled` for every submission.
    pub fn disabled() -> Self {
        Self::build(None, &ConsensusConfig::default())
    }

    pub fn new(ledger: Arc<dyn ConsensusLedger>, config: &ConsensusConfig) -> Self {
        Self::build(Some(ledger), config)
    }

    fn build(ledger: Option<Arc<dyn ConsensusLedger>>, config: &ConsensusConfig) -> Self {
        Self {
            ledger,
            topics: Arc::new(TopicDirectory {
                configured: config.topics.clone(),
                memo_prefix: config.topic_memo_prefix.clone(),
                created: Mutex::new(HashMap::new()),
            }),
            wait_budget: config.wait_budget(),
            sink: None,
            metrics: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReceiptSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.ledger.is_some()
    }

    pub fn wait_budget(&self) -> Duration {
        self.wait_budget
    }

    /// Anchor `payload` under `topic_key`. Never fails and never retries.
    ///
    /// `decision_id` routes a late receipt to the sink; without it a late
    /// receipt is only logged.
    pub async fn submit(&self, topic_key: &str, payload: &Value, decision_id: Option<Uuid>) -> AnchorOutcome {
        let Some(ledger) = self.ledger.clone() else {
            return AnchorOutcome::Disabled;
        };

        let message = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => return self.skipped(topic_key, "consensus_encode", &e.to_string()),
        };

        let (tx, rx) = if self.wait_budget.is_zero() {
            (None, None)
        } else {
            let (tx, rx) = oneshot::channel::<Submission>();
            (Some(tx), Some(rx))
        };

        let topics = self.topics.clone();
        let key = topic_key.to_string();
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let result = match topics.resolve(ledger.as_ref(), &key).await {
                Ok(topic_id) => ledger
                    .submit_message(&topic_id, &message)
                    .await
                    .map(|receipt| to_ref(&topic_id, receipt)),
                Err(e) => Err(e),
            };
            // A closed or absent receiver means the caller already moved on
            let late = match tx {
                Some(tx) => tx.send(result).err(),
                None => Some(result),
            };
            if let Some(result) = late {
                deliver_late(&key, decision_id, sink.as_deref(), metrics.as_ref(), result);
            }
        });

        let Some(mut rx) = rx else {
            return self.pending(topic_key);
        };

        let raced = match tokio::time::timeout(self.wait_budget, &mut rx).await {
            Ok(delivered) => delivered,
            Err(_) => {
                // After close() a send either already landed or fails and goes late
                rx.close();
                match rx.try_recv() {
                    Ok(result) => Ok(result),
                    Err(_) => return self.pending(topic_key),
                }
            }
        };

        match raced {
            Ok(Ok(reference)) => {
                if let Some(m) = &self.metrics {
                    m.record_anchor_confirmed();
                }
                debug!(
                    target: targets::CONSENSUS,
                    topic_key,
                    topic_id = %reference.topic_id,
                    sequence_number = ?reference.sequence_number,
                    "Anchor confirmed"
                );
                AnchorOutcome::Confirmed(reference)
            }
            Ok(Err(e)) => self.skipped(topic_key, e.reason_code(), &e.to_string()),
            Err(_) => self.skipped(topic_key, "consensus_task_dropped", "submission task ended without a result"),
        }
    }

    fn pending(&self, topic_key: &str) -> AnchorOutcome {
        let topic_id = self.topics.known(topic_key);
        if let Some(m) = &self.metrics {
            m.record_anchor_pending();
        }
        debug!(
            target: targets::CONSENSUS,
            topic_key,
            topic_id = ?topic_id,
            budget_ms = self.wait_budget.as_millis() as u64,
            "Anchor pending"
        );
        AnchorOutcome::Pending { topic_id }
    }

    fn skipped(&self, topic_key: &str, reason: &str, detail: &str) -> AnchorOutcome {
        if let Some(m) = &self.metrics {
            m.record_anchor_skipped();
        }
        warn!(target: targets::CONSENSUS, topic_key, reason, error = detail, "Anchor skipped");
        AnchorOutcome::Skipped(reason.to_string())
    }
}

fn deliver_late(
    topic_key: &str,
    decision_id: Option<Uuid>,
    sink: Option<&dyn ReceiptSink>,
    metrics: Option<&PipelineMetrics>,
    result: Submission,
) {
    match result {
        Ok(reference) => {
            let topic_id = reference.topic_id.clone();
            let sequence_number = reference.sequence_number.clone();
            let applied = match (decision_id, sink) {
                (Some(id), Some(sink)) => sink.apply_receipt(id, reference),
                _ => false,
            };
            if let Some(m) = metrics {
                m.record_late_receipt();
            }
            info!(
                target: targets::CONSENSUS,
                topic_key,
                decision_id = ?decision_id,
                topic_id = %topic_id,
                sequence_number = ?sequence_number,
                applied,
                "Late consensus receipt"
            );
        }
        Err(e) => {
            if let (Some(id), Some(sink)) = (decision_id, sink) {
                sink.abandon_receipt(id);
            }
            warn!(
                target: targets::CONSENSUS,
                topic_key,
                decision_id = ?decision_id,
                reason = e.reason_code(),
                error = %e,
                "Consensus submission failed after wait budget"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::consensus::MemoryLedger;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    #[derive(Default)]
    struct CapturingSink {
        applied: StdMutex<Vec<(Uuid, ConsensusRef)>>,
        abandoned: StdMutex<Vec<Uuid>>,
    }

    impl CapturingSink {
        fn settled(&self) -> usize {
            self.applied.lock().unwrap().len() + self.abandoned.lock().unwrap().len()
        }
    }

    impl ReceiptSink for CapturingSink {
        fn apply_receipt(&self, id: Uuid, reference: ConsensusRef) -> bool {
            self.applied.lock().unwrap().push((id, reference));
            true
        }

        fn abandon_receipt(&self, id: Uuid) {
            self.abandoned.lock().unwrap().push(id);
        }
    }

    /// Ledger whose topic creation never finishes for one memo suffix.
    struct StalledTopicLedger {
        stalled_key: &'static str,
        inner: MemoryLedger,
    }

    #[async_trait]
    impl ConsensusLedger for StalledTopicLedger {
        async fn create_topic(&self, memo: &str) -> Result<String, LedgerError> {
            if memo.ends_with(self.stalled_key) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.create_topic(memo).await
        }

        async fn submit_message(&self, topic_id: &str, message: &[u8]) -> Result<Receipt, LedgerError> {
            self.inner.submit_message(topic_id, message).await
        }
    }

    fn config(wait_budget_ms: u64) -> ConsensusConfig {
        ConsensusConfig {
            wait_budget_ms,
            ..ConsensusConfig::default()
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // ========================================================================
    // Outcomes
    // ========================================================================

    #[tokio::test]
    async fn test_disabled_without_ledger() {
        let anchor = ConsensusAnchor::disabled();
        assert!(!anchor.is_enabled());
        let outcome = anchor.submit("rail", &json!({"a": 1}), None).await;
        assert_eq!(outcome, AnchorOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_confirmed_within_budget() {
        let ledger = Arc::new(MemoryLedger::new());
        let anchor = ConsensusAnchor::new(ledger.clone(), &config(1500));
        let outcome = anchor.submit("traffic", &json!({"a": 1}), None).await;
        let reference = outcome.reference().cloned().unwrap();
        assert_eq!(reference.sequence_number.as_deref(), Some("1"));
        assert_eq!(ledger.messages(&reference.topic_id).len(), 1);
    }

    #[tokio::test]
    async fn test_submission_error_is_skipped() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.fail_next(1);
        let anchor = ConsensusAnchor::new(ledger, &config(1500));
        let outcome = anchor.submit("rail", &json!({}), None).await;
        assert_eq!(outcome, AnchorOutcome::Skipped("consensus_transport".into()));
    }

    // ========================================================================
    // Topics
    // ========================================================================

    #[tokio::test]
    async fn test_topic_created_once_per_key() {
        let ledger = Arc::new(MemoryLedger::new());
        let anchor = ConsensusAnchor::new(ledger.clone(), &config(1500));
        let first = json!({"n": 1});
        let second = json!({"n": 2});
        let (a, b) = tokio::join!(
            anchor.submit("rail", &first, None),
            anchor.submit("rail", &second, None),
        );
        assert_eq!(a.reference().unwrap().topic_id, b.reference().unwrap().topic_id);
        anchor.submit("traffic", &json!({"n": 3}), None).await;
        assert_eq!(ledger.topics_created(), 2);
    }

    #[tokio::test]
    async fn test_configured_topic_skips_creation() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut cfg = config(1500);
        cfg.topics.rail = Some("0.0.777".into());
        let anchor = ConsensusAnchor::new(ledger.clone(), &cfg);
        let outcome = anchor.submit("rail", &json!({}), None).await;
        assert_eq!(outcome.reference().unwrap().topic_id, "0.0.777");
        assert_eq!(ledger.topics_created(), 0);
    }

    #[tokio::test]
    async fn test_stalled_topic_creation_does_not_block_other_keys() {
        let ledger = Arc::new(StalledTopicLedger {
            stalled_key: "traffic",
            inner: MemoryLedger::new(),
        });
        let anchor = Arc::new(ConsensusAnchor::new(ledger, &config(1500)));

        let stalled = anchor.clone();
        let traffic = tokio::spawn(async move { stalled.submit("traffic", &json!({}), None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let outcome = anchor.submit("rail", &json!({}), None).await;
        assert!(outcome.reference().is_some());
        assert!(started.elapsed() < Duration::from_millis(500));
        traffic.abort();
    }

    #[tokio::test]
    async fn test_topic_creation_counts_against_budget() {
        let ledger = Arc::new(StalledTopicLedger {
            stalled_key: "traffic",
            inner: MemoryLedger::new(),
        });
        let anchor = ConsensusAnchor::new(ledger, &config(50));

        let started = Instant::now();
        let outcome = anchor.submit("traffic", &json!({}), None).await;
        assert_eq!(outcome, AnchorOutcome::Pending { topic_id: None });
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    // ========================================================================
    // Late receipts
    // ========================================================================

    #[tokio::test]
    async fn test_zero_budget_is_pending_and_receipt_arrives_late() {
        let ledger = Arc::new(MemoryLedger::new());
        let sink = Arc::new(CapturingSink::default());
        let anchor = ConsensusAnchor::new(ledger, &config(0)).with_sink(sink.clone());
        let id = Uuid::new_v4();

        let outcome = anchor.submit("rail", &json!({}), Some(id)).await;
        assert!(outcome.is_pending());

        wait_until(|| sink.settled() > 0).await;
        let applied = sink.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, id);
    }

    #[tokio::test]
    async fn test_zero_budget_never_waits_for_topic_creation() {
        let ledger = Arc::new(StalledTopicLedger {
            stalled_key: "rail",
            inner: MemoryLedger::new(),
        });
        let anchor = ConsensusAnchor::new(ledger, &config(0));

        let started = Instant::now();
        let outcome = anchor.submit("rail", &json!({}), Some(Uuid::new_v4())).await;
        assert_eq!(outcome, AnchorOutcome::Pending { topic_id: None });
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_budget_delivers_every_receipt_to_sink() {
        let ledger = Arc::new(MemoryLedger::new());
        let sink = Arc::new(CapturingSink::default());
        let anchor = ConsensusAnchor::new(ledger, &config(0)).with_sink(sink.clone());

        let total = 500;
        for n in 0..total {
            let outcome = anchor.submit("rail", &json!({"n": n}), Some(Uuid::new_v4())).await;
            assert!(outcome.is_pending());
        }

        wait_until(|| sink.settled() == total).await;
        assert_eq!(sink.applied.lock().unwrap().len(), total);
        assert!(sink.abandoned.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_budget_failure_is_abandoned() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.fail_next(1);
        let sink = Arc::new(CapturingSink::default());
        let anchor = ConsensusAnchor::new(ledger, &config(0)).with_sink(sink.clone());
        let id = Uuid::new_v4();

        assert!(anchor.submit("rail", &json!({}), Some(id)).await.is_pending());
        wait_until(|| sink.settled() > 0).await;
        assert_eq!(*sink.abandoned.lock().unwrap(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ledger_reports_pending() {
        let ledger = Arc::new(MemoryLedger::new().with_delay(Duration::from_secs(5)));
        let metrics = PipelineMetrics::new();
        let sink = Arc::new(CapturingSink::default());
        let anchor = ConsensusAnchor::new(ledger, &config(100))
            .with_sink(sink.clone())
            .with_metrics(metrics.clone());

        let outcome = anchor.submit("rail", &json!({}), Some(Uuid::new_v4())).await;
        assert!(outcome.is_pending());
        assert_eq!(metrics.anchors(), (0, 1, 0));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.applied.lock().unwrap().len(), 1);
    }
}
