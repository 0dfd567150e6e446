//! Cross-domain safety check over the latest traffic and rail decisions.
//!
//! Read-only with respect to the pipeline. The only side effects are logging,
//! metrics and optionally anchoring the report.

use serde::{Serialize, Serializer};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::control::consensus::{AnchorOutcome, ConsensusAnchor};
use crate::control::decision_log::DecisionLog;
use crate::control::infra::{targets, PipelineMetrics};
use crate::types::{now_ms, AgentKind, BarrierState, Decision, SignalState, TimestampMs};

/// Topic key used when anchoring supervisor reports.
pub const SUPERVISOR_TOPIC: &str = "supervisor";

/// A flagged combination. Serialized as a single `code: detail` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub code: &'static str,
    pub detail: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl Serialize for Finding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorReport {
    pub ok: bool,
    pub anomalies: Vec<Finding>,
    pub advisories: Vec<Finding>,
    pub ts: TimestampMs,
}

/// Evaluate the latest decision of each domain.
///
/// The cross-check needs both domains; a missing one only skips it.
pub fn evaluate(traffic: Option<&Decision>, rail: Option<&Decision>) -> SupervisorReport {
    let mut anomalies = Vec::new();
    let mut advisories = Vec::new();

    let plan = traffic.and_then(|d| d.outcome.as_traffic());
    let barrier = rail.and_then(|d| d.outcome.as_rail());

    if let (Some(plan), Some(barrier)) = (plan, barrier) {
        if barrier.state == BarrierState::Closed && plan.ns == SignalState::Green {
            anomalies.push(Finding {
                code: "barrier_closed_ns_green",
                detail: "Barrier CLOSED while north-south traffic has green".into(),
            });
        }
        if barrier.state == BarrierState::Open && plan.ew == SignalState::Green && plan.ns == SignalState::Red {
            advisories.push(Finding {
                code: "barrier_open_ew_green",
                detail: "Barrier OPEN while east-west has green and north-south red".into(),
            });
        }
    }

    for decision in [traffic, rail].into_iter().flatten() {
        if decision.is_fallback() {
            advisories.push(Finding {
                code: "domain_in_fallback",
                detail: format!("{} is running on the fallback rule", decision.agent),
            });
        }
    }

    SupervisorReport {
        ok: anomalies.is_empty(),
        anomalies,
        advisories,
        ts: now_ms(),
    }
}

pub struct SupervisorCheck {
    log: Arc<DecisionLog>,
    anchor: Option<Arc<ConsensusAnchor>>,
    metrics: Option<PipelineMetrics>,
}

impl SupervisorCheck {
    pub fn new(log: Arc<DecisionLog>) -> Self {
        Self {
            log,
            anchor: None,
            metrics: None,
        }
    }

    /// Anchor every report under [`SUPERVISOR_TOPIC`].
    pub fn with_anchor(mut self, anchor: Arc<ConsensusAnchor>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one check against the current log contents. Never fails.
    pub async fn run(&self) -> SupervisorReport {
        let traffic = self.log.latest_for(AgentKind::Traffic);
        let rail = self.log.latest_for(AgentKind::Rail);
        let report = evaluate(traffic.as_ref(), rail.as_ref());

        if let Some(m) = &self.metrics {
            m.record_supervisor_check(report.anomalies.len());
        }

        for anomaly in &report.anomalies {
            warn!(
                target: targets::SUPERVISOR,
                code = anomaly.code,
                traffic_decision = ?traffic.as_ref().map(|d| d.id),
                rail_decision = ?rail.as_ref().map(|d| d.id),
                "{}",
                anomaly.detail
            );
        }

        debug!(
            target: targets::SUPERVISOR,
            ok = report.ok,
            anomalies = report.anomalies.len(),
            advisories = report.advisories.len(),
            "Supervisor check complete"
        );

        if let Some(anchor) = &self.anchor {
            let payload = json!(report);
            if let AnchorOutcome::Skipped(reason) = anchor.submit(SUPERVISOR_TOPIC, &payload, None).await {
                debug!(target: targets::SUPERVISOR, reason = %reason, "Supervisor report not anchored");
            }
        }

        report
    }
}
