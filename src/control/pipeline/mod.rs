//! Decision pipeline: measurement → observation → inference chain or fallback
//! → actuation → anchoring → decision log.
//!
//! Nothing in a tick is fatal. Every failure along the way is turned into a
//! reason code in the decision's `reasoning.failures` and processing moves on
//! to the next measurement.

mod observation;

pub use observation::*;

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::control::actuation::{Actuator, NoopActuator};
use crate::control::config::PipelineConfig;
use crate::control::consensus::{AnchorOutcome, ConsensusAnchor};
use crate::control::decision_log::DecisionLog;
use crate::control::fallback::FallbackPolicy;
use crate::control::inference::{InferenceGateway, PolicyDecision};
use crate::control::infra::{targets, PipelineMetrics};
use crate::control::measurement::MeasurementStore;
use crate::types::{
    now_ms, AgentKind, Decision, DecisionSource, DecisionStatus, Measurement, Observation, Outcome,
    PhaseMemory,
};

/// Summary of one tick for one agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub kind: AgentKind,
    pub processed: usize,
    pub policy: usize,
    pub fallback: usize,
    /// Decisions confirmed by the ledger within the wait budget
    pub anchored: usize,
    /// Measurements still queued after the tick
    pub pending: usize,
}

impl TickReport {
    fn empty(kind: AgentKind) -> Self {
        Self {
            kind,
            processed: 0,
            policy: 0,
            fallback: 0,
            anchored: 0,
            pending: 0,
        }
    }
}

/// Advance remembered phase state from a produced outcome.
pub fn remember_outcome(memory: &mut PhaseMemory, outcome: &Outcome) {
    match outcome {
        Outcome::Traffic(plan) => {
            if let Some(phase) = plan.green_phase() {
                memory.traffic_phase = phase;
            }
        }
        Outcome::Rail(command) => memory.barrier = command.state.position(),
    }
}

pub struct DecisionPipeline {
    config: PipelineConfig,
    store: Arc<MeasurementStore>,
    log: Arc<DecisionLog>,
    fallback: FallbackPolicy,
    primary: Option<InferenceGateway>,
    secondary: Option<InferenceGateway>,
    anchor: Arc<ConsensusAnchor>,
    actuator: Arc<dyn Actuator>,
    metrics: PipelineMetrics,
}

impl DecisionPipeline {
    /// Pipeline with no inference routes, no anchoring and log-only actuation.
    pub fn new(
        config: PipelineConfig,
        store: Arc<MeasurementStore>,
        log: Arc<DecisionLog>,
        fallback: FallbackPolicy,
    ) -> Self {
        Self {
            config,
            store,
            log,
            fallback,
            primary: None,
            secondary: None,
            anchor: Arc::new(ConsensusAnchor::disabled()),
            actuator: Arc::new(NoopActuator),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_primary(mut self, gateway: InferenceGateway) -> Self {
        self.primary = Some(gateway);
        self
    }

    pub fn with_secondary(mut self, gateway: InferenceGateway) -> Self {
        self.secondary = Some(gateway);
        self
    }

    pub fn with_anchor(mut self, anchor: Arc<ConsensusAnchor>) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_actuator(mut self, actuator: Arc<dyn Actuator>) -> Self {
        self.actuator = actuator;
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MeasurementStore> {
        &self.store
    }

    pub fn log(&self) -> &Arc<DecisionLog> {
        &self.log
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Drain up to the batch limit for `kind`, stopping early on an empty queue.
    pub async fn tick(&self, kind: AgentKind, memory: &mut PhaseMemory) -> TickReport {
        let limit = self.config.batch_limit(kind);
        let mut report = TickReport::empty(kind);

        while report.processed < limit {
            let Some(measurement) = self.store.dequeue_next(kind) else {
                break;
            };
            let decision = self.process_measurement(kind, measurement, memory).await;
            report.processed += 1;
            match decision.source {
                DecisionSource::Policy => report.policy += 1,
                DecisionSource::Fallback => report.fallback += 1,
            }
            if decision.consensus.is_some() {
                report.anchored += 1;
            }
        }

        report.pending = self.store.pending_len(kind);
        self.metrics.set_pending_depth(kind, report.pending);

        if report.processed > 0 {
            debug!(
                target: targets::PIPELINE,
                agent = %kind,
                processed = report.processed,
                policy = report.policy,
                fallback = report.fallback,
                anchored = report.anchored,
                pending = report.pending,
                "Tick complete"
            );
        }
        report
    }

    /// Try each configured route in order; first valid answer wins.
    async fn infer(
        &self,
        kind: AgentKind,
        observation: &Observation,
        context: &Map<String, Value>,
        failures: &mut Vec<String>,
    ) -> Option<(&'static str, PolicyDecision)> {
        for gateway in [&self.primary, &self.secondary].into_iter().flatten() {
            match gateway.request_decision(kind, observation, context.clone()).await {
                Ok(decision) => return Some((gateway.route(), decision)),
                Err(e) => {
                    self.metrics.record_inference_failure(kind);
                    failures.push(format!("{}:{}", gateway.route(), e.reason_label()));
                }
            }
        }
        None
    }

    /// Turn one measurement into a recorded decision.
    pub async fn process_measurement(
        &self,
        kind: AgentKind,
        measurement: Measurement,
        memory: &mut PhaseMemory,
    ) -> Decision {
        let mut failures: Vec<String> = Vec::new();

        let strict = match build_observation(kind, &measurement, memory) {
            Ok(observation) => Some(observation),
            Err(e) => {
                self.metrics.record_observation_failure(kind);
                warn!(
                    target: targets::PIPELINE,
                    agent = %kind,
                    location = %measurement.location,
                    reason = %e.reason_code(),
                    "Observation could not be built, skipping inference"
                );
                failures.push(e.reason_code());
                None
            }
        };

        let mut context = Map::new();
        context.insert("location".into(), json!(measurement.location));
        context.insert("measurementTs".into(), json!(measurement.ts));
        context.insert("metric".into(), json!(measurement.metric));

        let policy = match &strict {
            Some(observation) => self.infer(kind, observation, &context, &mut failures).await,
            None => None,
        };

        let observation = strict.unwrap_or_else(|| lenient_observation(kind, &measurement, memory));

        let (source, outcome, confidence, action_index, policy_metadata, reasoning) = match policy {
            Some((route, decision)) => (
                DecisionSource::Policy,
                decision.outcome,
                decision.confidence,
                decision.action_index,
                decision.policy_metadata,
                json!({ "route": route, "failures": failures }),
            ),
            None => {
                let (outcome, rule) = self.fallback.decide(&observation);
                (
                    DecisionSource::Fallback,
                    outcome,
                    None,
                    None,
                    None,
                    json!({ "route": "fallback", "failures": failures, "rule": rule }),
                )
            }
        };

        remember_outcome(memory, &outcome);

        let status = match self
            .actuator
            .apply_outcome(kind, &measurement.location, &outcome)
            .await
        {
            Ok(()) => DecisionStatus::Applied,
            Err(e) => {
                self.metrics.record_actuation_failure(kind);
                warn!(
                    target: targets::ACTUATION,
                    agent = %kind,
                    location = %measurement.location,
                    reason = e.reason_code(),
                    error = %e,
                    "Actuation failed, recording decision anyway"
                );
                DecisionStatus::ActuationFailed
            }
        };

        let mut decision = Decision {
            id: Uuid::new_v4(),
            agent: kind,
            location: Some(measurement.location),
            source,
            observation: Some(observation),
            outcome,
            confidence,
            action_index,
            policy_metadata,
            reasoning: Some(reasoning),
            status,
            ts: now_ms(),
            consensus: None,
            consensus_pending: false,
        };
        if status == DecisionStatus::ActuationFailed {
            push_failure(&mut decision, "actuation_failed");
        }

        match self
            .anchor
            .submit(kind.as_str(), &decision.anchor_payload(), Some(decision.id))
            .await
        {
            AnchorOutcome::Confirmed(reference) => decision.consensus = Some(reference),
            AnchorOutcome::Pending { .. } => decision.consensus_pending = true,
            AnchorOutcome::Skipped(reason) => push_failure(&mut decision, &reason),
            AnchorOutcome::Disabled => {}
        }

        let decision = self.log.record(decision);
        self.metrics.record_decision(kind, decision.source);

        info!(
            target: targets::PIPELINE,
            decision_id = %decision.id,
            agent = %kind,
            location = decision.location.as_deref().unwrap_or("unknown"),
            source = decision.source.as_str(),
            status = decision.status.as_str(),
            outcome = %json!(decision.outcome),
            anchored = decision.consensus.is_some(),
            consensus_pending = decision.consensus_pending,
            "Decision recorded"
        );
        decision
    }
}

fn push_failure(decision: &mut Decision, code: &str) {
    if let Some(failures) = decision
        .reasoning
        .as_mut()
        .and_then(|r| r.get_mut("failures"))
        .and_then(Value::as_array_mut)
    {
        failures.push(Value::String(code.to_string()));
    }
}
