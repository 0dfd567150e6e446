//! Bounded in-memory log of recorded decisions.
//!
//! Eviction is strict FIFO from the front. The only mutation allowed after
//! `record` is filling `consensus` once, through [`DecisionLog::apply_receipt`].

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use uuid::Uuid;

use crate::control::config::RetentionConfig;
use crate::control::consensus::ReceiptSink;
use crate::control::infra::targets;
use crate::types::{AgentKind, ConsensusRef, Decision, ExternalDecision};

/// Hard cap on `latest_per_key` results when a limit is given.
pub const MAX_QUERY_LIMIT: usize = 100;

const UNKNOWN_LOCATION: &str = "unknown";

#[derive(Debug, Default)]
struct LogInner {
    entries: VecDeque<Decision>,
    /// Anchor results that arrived before their decision was recorded.
    /// `None` marks a submission that failed after the wait budget.
    parked: HashMap<Uuid, Option<ConsensusRef>>,
    parked_order: VecDeque<Uuid>,
}

#[derive(Debug)]
pub struct DecisionLog {
    capacity: usize,
    inner: RwLock<LogInner>,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(LogInner::default()),
        }
    }

    pub fn from_retention(retention: &RetentionConfig) -> Self {
        Self::new(retention.decision_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, LogInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a decision, evicting the oldest entries past capacity.
    ///
    /// A receipt parked for this id is applied before the entry becomes visible.
    pub fn record(&self, mut decision: Decision) -> Decision {
        let mut inner = self.write();

        if let Some(parked) = inner.parked.remove(&decision.id) {
            inner.parked_order.retain(|id| *id != decision.id);
            if decision.consensus.is_none() {
                decision.consensus = parked;
            }
            decision.consensus_pending = false;
        }

        inner.entries.push_back(decision.clone());
        while inner.entries.len() > self.capacity {
            if let Some(evicted) = inner.entries.pop_front() {
                debug!(
                    target: targets::PIPELINE,
                    decision_id = %evicted.id,
                    agent = %evicted.agent,
                    "Evicted decision from log"
                );
            }
        }
        decision
    }

    /// Record a decision produced outside the pipeline.
    pub fn record_external(&self, entry: ExternalDecision) -> Decision {
        let decision = self.record(entry.into_decision());
        info!(
            target: targets::PIPELINE,
            decision_id = %decision.id,
            agent = %decision.agent,
            location = decision.location.as_deref().unwrap_or(UNKNOWN_LOCATION),
            "Recorded external decision"
        );
        decision
    }

    /// Latest decision per `(agent, location)`, newest first.
    ///
    /// Keys compare case-insensitively and a missing location groups as
    /// `unknown`. On equal timestamps the later insertion wins. A given
    /// `limit` is capped at [`MAX_QUERY_LIMIT`]; `None` returns every key.
    pub fn latest_per_key(&self, agent: Option<AgentKind>, limit: Option<usize>) -> Vec<Decision> {
        let inner = self.read();

        let mut latest: HashMap<(AgentKind, String), &Decision> = HashMap::new();
        for decision in inner.entries.iter() {
            if agent.is_some_and(|a| a != decision.agent) {
                continue;
            }
            let location = decision
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(UNKNOWN_LOCATION)
                .to_lowercase();
            latest
                .entry((decision.agent, location))
                .and_modify(|current| {
                    // Iteration is insertion order, so >= lets later entries win ties
                    if decision.ts >= current.ts {
                        *current = decision;
                    }
                })
                .or_insert(decision);
        }

        let mut result: Vec<Decision> = latest.into_values().cloned().collect();
        result.sort_by(|a, b| b.ts.cmp(&a.ts));
        if let Some(limit) = limit {
            result.truncate(limit.min(MAX_QUERY_LIMIT));
        }
        result
    }

    /// Most recent decision for one agent kind across all locations.
    pub fn latest_for(&self, agent: AgentKind) -> Option<Decision> {
        self.latest_per_key(Some(agent), Some(1)).into_iter().next()
    }

    /// Fill `consensus` for a recorded decision if it is still empty.
    ///
    /// Returns false when the decision already carries a reference. A receipt
    /// for an id not yet in the log is parked and applied on `record`.
    pub fn apply_receipt(&self, id: Uuid, reference: ConsensusRef) -> bool {
        self.settle(id, Some(reference))
    }

    /// Clear the pending flag after a submission failed past the wait budget.
    pub fn abandon_receipt(&self, id: Uuid) {
        self.settle(id, None);
    }

    fn settle(&self, id: Uuid, reference: Option<ConsensusRef>) -> bool {
        let mut inner = self.write();

        if let Some(entry) = inner.entries.iter_mut().find(|d| d.id == id) {
            if entry.consensus.is_some() {
                return false;
            }
            entry.consensus_pending = false;
            let applied = reference.is_some();
            entry.consensus = reference;
            return applied;
        }

        if !inner.parked.contains_key(&id) {
            inner.parked_order.push_back(id);
        }
        inner.parked.insert(id, reference);
        while inner.parked_order.len() > self.capacity {
            if let Some(stale) = inner.parked_order.pop_front() {
                inner.parked.remove(&stale);
            }
        }
        false
    }

    pub fn get(&self, id: Uuid) -> Option<Decision> {
        self.read().entries.iter().find(|d| d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Newest-first slice of the log.
    pub fn recent(&self, limit: usize) -> Vec<Decision> {
        self.read().entries.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::from_retention(&RetentionConfig::default())
    }
}

impl ReceiptSink for DecisionLog {
    fn apply_receipt(&self, id: Uuid, reference: ConsensusRef) -> bool {
        DecisionLog::apply_receipt(self, id, reference)
    }

    fn abandon_receipt(&self, id: Uuid) {
        DecisionLog::abandon_receipt(self, id)
    }
}
