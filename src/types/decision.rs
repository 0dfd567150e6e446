//! Decision records and their consensus anchor references.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{now_ms, AgentKind, Observation, Outcome, TimestampMs};

/// Where the outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    /// An inference route (primary or secondary) answered with a valid outcome
    #[default]
    Policy,
    /// The deterministic fallback rule produced the outcome
    Fallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Policy => "policy",
            DecisionSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Outcome was handed to the actuation endpoint successfully
    Applied,
    /// Actuation failed; the decision is still recorded
    ActuationFailed,
    /// Externally originated decision recorded without actuation
    Recorded,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Applied => "applied",
            DecisionStatus::ActuationFailed => "actuation_failed",
            DecisionStatus::Recorded => "recorded",
        }
    }
}

/// Reference to a decision's position in the consensus ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusRef {
    pub topic_id: String,
    pub sequence_number: Option<String>,
    pub consensus_timestamp: Option<String>,
}

/// A control decision.
///
/// Immutable once recorded, apart from `consensus` which a late receipt may
/// fill in exactly once.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: Uuid,
    pub agent: AgentKind,
    pub location: Option<String>,
    pub source: DecisionSource,
    pub observation: Option<Observation>,
    pub outcome: Outcome,
    pub confidence: Option<f64>,
    pub action_index: Option<i64>,
    pub policy_metadata: Option<Map<String, Value>>,
    pub reasoning: Option<Value>,
    pub status: DecisionStatus,
    pub ts: TimestampMs,
    pub consensus: Option<ConsensusRef>,
    /// True while an anchor submission is still awaiting its receipt
    #[serde(default)]
    pub consensus_pending: bool,
}

impl Decision {
    /// Message body submitted to the consensus ledger.
    pub fn anchor_payload(&self) -> Value {
        json!({
            "decisionId": self.id,
            "agent": self.agent,
            "location": self.location,
            "source": self.source,
            "outcome": self.outcome,
            "observation": self.observation,
            "status": self.status,
            "confidence": self.confidence,
            "actionIndex": self.action_index,
            "policyMetadata": self.policy_metadata,
            "reasoning": self.reasoning,
            "timestamp": self.ts,
        })
    }

    /// Whether the decision was produced by the fallback rule.
    pub fn is_fallback(&self) -> bool {
        self.source == DecisionSource::Fallback
    }
}

/// Decision produced outside the pipeline and recorded through the query surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDecision {
    pub agent: AgentKind,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: DecisionSource,
    pub outcome: Outcome,
    #[serde(default)]
    pub observation: Option<Observation>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub action_index: Option<i64>,
    #[serde(default)]
    pub policy_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub reasoning: Option<Value>,
    #[serde(default)]
    pub ts: Option<TimestampMs>,
}

impl ExternalDecision {
    pub fn into_decision(self) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            agent: self.agent,
            location: self.location,
            source: self.source,
            observation: self.observation,
            outcome: self.outcome,
            confidence: self.confidence,
            action_index: self.action_index,
            policy_metadata: self.policy_metadata,
            reasoning: self.reasoning,
            status: DecisionStatus::Recorded,
            ts: self.ts.unwrap_or_else(now_ms),
            consensus: None,
            consensus_pending: false,
        }
    }
}
