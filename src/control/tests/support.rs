//! Test doubles and a pipeline harness.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::control::config::{ConsensusConfig, PipelineConfig};
use crate::control::consensus::{ConsensusAnchor, MemoryLedger};
use crate::control::decision_log::DecisionLog;
use crate::control::fallback::FallbackPolicy;
use crate::control::inference::{InferenceGateway, InferenceOracle, InferenceRequest};
use crate::control::actuation::Actuator;
use crate::control::infra::PipelineMetrics;
use crate::control::measurement::MeasurementStore;
use crate::control::pipeline::DecisionPipeline;
use crate::errors::{ActuationError, InferenceError};
use crate::types::{AgentKind, Observation, Outcome};

/// Scripted oracle reply.
#[derive(Clone)]
pub(super) enum Reply {
    Body(Value),
    Fail(InferenceError),
    /// Never answers within any reasonable timeout
    Hang,
}

/// Oracle that plays back a script, repeating the last reply when exhausted.
pub(super) struct ScriptedOracle {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    seen: Mutex<Vec<Observation>>,
}

impl ScriptedOracle {
    pub(super) fn new(name: &str, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn always(name: &str, reply: Reply) -> Arc<Self> {
        Self::new(name, vec![reply])
    }

    pub(super) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(super) fn observations(&self) -> Vec<Observation> {
        self.seen.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = script.pop_front() {
            *last = Some(reply.clone());
            return reply;
        }
        last.clone()
            .unwrap_or_else(|| Reply::Fail(InferenceError::Unreachable("empty script".into())))
    }
}

#[async_trait]
impl InferenceOracle for ScriptedOracle {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn infer(&self, _kind: AgentKind, request: &InferenceRequest) -> Result<Value, InferenceError> {
        self.seen.lock().unwrap().push(request.observation);
        match self.next_reply() {
            Reply::Body(body) => Ok(body),
            Reply::Fail(e) => Err(e),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(InferenceError::Unreachable("hung".into()))
            }
        }
    }
}

/// Actuator that records every call and can be told to fail.
#[derive(Default)]
pub(super) struct RecordingActuator {
    calls: Mutex<Vec<(AgentKind, String, Outcome)>>,
    fail: Mutex<bool>,
}

impl RecordingActuator {
    pub(super) fn failing() -> Self {
        Self {
            fail: Mutex::new(true),
            ..Self::default()
        }
    }

    pub(super) fn calls(&self) -> Vec<(AgentKind, String, Outcome)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn apply_outcome(&self, kind: AgentKind, location: &str, outcome: &Outcome) -> Result<(), ActuationError> {
        self.calls
            .lock()
            .unwrap()
            .push((kind, location.to_string(), *outcome));
        if *self.fail.lock().unwrap() {
            return Err(ActuationError::Rejected {
                status: 503,
                message: "controller offline".into(),
            });
        }
        Ok(())
    }
}

/// Fully wired pipeline plus handles on every collaborator.
pub(super) struct Harness {
    pub(super) pipeline: DecisionPipeline,
    pub(super) store: Arc<MeasurementStore>,
    pub(super) log: Arc<DecisionLog>,
    pub(super) actuator: Arc<RecordingActuator>,
    pub(super) ledger: Option<Arc<MemoryLedger>>,
    pub(super) metrics: PipelineMetrics,
}

pub(super) struct HarnessBuilder {
    primary: Option<Arc<ScriptedOracle>>,
    secondary: Option<Arc<ScriptedOracle>>,
    ledger: Option<(Arc<MemoryLedger>, u64)>,
    actuator: RecordingActuator,
    timeout: Duration,
    log_capacity: usize,
}

impl HarnessBuilder {
    pub(super) fn new() -> Self {
        Self {
            primary: None,
            secondary: None,
            ledger: None,
            actuator: RecordingActuator::default(),
            timeout: Duration::from_millis(500),
            log_capacity: 100,
        }
    }

    pub(super) fn primary(mut self, oracle: Arc<ScriptedOracle>) -> Self {
        self.primary = Some(oracle);
        self
    }

    pub(super) fn secondary(mut self, oracle: Arc<ScriptedOracle>) -> Self {
        self.secondary = Some(oracle);
        self
    }

    pub(super) fn ledger(mut self, ledger: MemoryLedger, wait_budget_ms: u64) -> Self {
        self.ledger = Some((Arc::new(ledger), wait_budget_ms));
        self
    }

    pub(super) fn actuator(mut self, actuator: RecordingActuator) -> Self {
        self.actuator = actuator;
        self
    }

    pub(super) fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub(super) fn build(self) -> Harness {
        let metrics = PipelineMetrics::new();
        let store = Arc::new(MeasurementStore::with_capacities(200, 1000).with_metrics(metrics.clone()));
        let log = Arc::new(DecisionLog::new(self.log_capacity));
        let actuator = Arc::new(self.actuator);

        let mut pipeline = DecisionPipeline::new(
            PipelineConfig::default(),
            store.clone(),
            log.clone(),
            FallbackPolicy::default(),
        )
        .with_actuator(actuator.clone())
        .with_metrics(metrics.clone());

        if let Some(oracle) = self.primary {
            pipeline = pipeline.with_primary(InferenceGateway::new("primary", oracle, self.timeout));
        }
        if let Some(oracle) = self.secondary {
            pipeline = pipeline.with_secondary(InferenceGateway::new("secondary", oracle, self.timeout));
        }

        let mut ledger = None;
        if let Some((memory_ledger, wait_budget_ms)) = self.ledger {
            let config = ConsensusConfig {
                wait_budget_ms,
                ..ConsensusConfig::default()
            };
            let anchor = ConsensusAnchor::new(memory_ledger.clone(), &config)
                .with_sink(log.clone())
                .with_metrics(metrics.clone());
            pipeline = pipeline.with_anchor(Arc::new(anchor));
            ledger = Some(memory_ledger);
        }

        Harness {
            pipeline,
            store,
            log,
            actuator,
            ledger,
            metrics,
        }
    }
}
