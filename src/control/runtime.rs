//! Interval loops driving the pipeline.
//!
//! One loop per agent kind plus an optional supervisor loop. Loops are
//! independent tasks, so a slow tick in one domain never delays the other.
//! All loops stop when the shared `watch` flag flips to `true` or its sender
//! is dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::control::infra::targets;
use crate::control::pipeline::DecisionPipeline;
use crate::control::supervisor::SupervisorCheck;
use crate::types::{AgentKind, PhaseMemory};

pub struct ControlRuntime {
    pipeline: Arc<DecisionPipeline>,
    supervisor: Option<(Arc<SupervisorCheck>, Duration)>,
}

/// Final per-kind state returned when the runtime stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub kind: AgentKind,
    pub ticks: u64,
    pub memory: PhaseMemory,
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

impl ControlRuntime {
    pub fn new(pipeline: Arc<DecisionPipeline>) -> Self {
        Self {
            pipeline,
            supervisor: None,
        }
    }

    pub fn with_supervisor(mut self, check: Arc<SupervisorCheck>, interval: Duration) -> Self {
        self.supervisor = Some((check, interval));
        self
    }

    /// Run every loop until shutdown.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Vec<LoopSummary> {
        let agents: Vec<JoinHandle<LoopSummary>> = AgentKind::ALL
            .into_iter()
            .map(|kind| tokio::spawn(agent_loop(self.pipeline.clone(), kind, shutdown.clone())))
            .collect();

        let supervisor = self
            .supervisor
            .clone()
            .map(|(check, interval)| tokio::spawn(supervisor_loop(check, interval, shutdown.clone())));

        let mut summaries = Vec::with_capacity(agents.len());
        for handle in agents {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(target: targets::PIPELINE, error = %e, "Agent loop task failed"),
            }
        }
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                error!(target: targets::SUPERVISOR, error = %e, "Supervisor loop task failed");
            }
        }
        summaries
    }
}

async fn agent_loop(
    pipeline: Arc<DecisionPipeline>,
    kind: AgentKind,
    mut shutdown: watch::Receiver<bool>,
) -> LoopSummary {
    let mut memory = PhaseMemory::new();
    let mut ticks = 0u64;
    let period = pipeline.config().tick_interval();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        target: targets::PIPELINE,
        agent = %kind,
        interval_ms = period.as_millis() as u64,
        batch_limit = pipeline.config().batch_limit(kind),
        "Agent loop started"
    );

    while !stop_requested(&shutdown) {
        tokio::select! {
            _ = interval.tick() => {
                pipeline.tick(kind, &mut memory).await;
                ticks += 1;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(target: targets::PIPELINE, agent = %kind, ticks, "Agent loop stopped");
    LoopSummary { kind, ticks, memory }
}

async fn supervisor_loop(check: Arc<SupervisorCheck>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick fires immediately; skip it so the agents get a head start
    interval.tick().await;

    while !stop_requested(&shutdown) {
        tokio::select! {
            _ = interval.tick() => {
                check.run().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!(target: targets::SUPERVISOR, "Supervisor loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::config::PipelineConfig;
    use crate::control::decision_log::DecisionLog;
    use crate::control::fallback::FallbackPolicy;
    use crate::control::infra::PipelineMetrics;
    use crate::control::measurement::MeasurementStore;
    use crate::types::{BarrierPosition, TrafficPhase};
    use serde_json::json;

    fn pipeline(metrics: PipelineMetrics) -> (Arc<DecisionPipeline>, Arc<DecisionLog>) {
        let store = Arc::new(MeasurementStore::with_capacities(100, 100));
        let log = Arc::new(DecisionLog::new(100));
        let config = PipelineConfig {
            tick_interval_ms: 100,
            ..PipelineConfig::default()
        };
        let pipeline = DecisionPipeline::new(config, store, log.clone(), FallbackPolicy::default())
            .with_metrics(metrics);
        (Arc::new(pipeline), log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_drain_both_kinds_and_stop() {
        let metrics = PipelineMetrics::new();
        let (pipeline, log) = pipeline(metrics.clone());
        pipeline
            .store()
            .ingest(AgentKind::Traffic, "j1", json!({"queue_ns": 2, "queue_ew": 9}), None)
            .unwrap();
        pipeline
            .store()
            .ingest(AgentKind::Rail, "c1", json!({"etaMs": 5000}), None)
            .unwrap();

        let supervisor = Arc::new(SupervisorCheck::new(log.clone()).with_metrics(metrics.clone()));
        let runtime = ControlRuntime::new(pipeline).with_supervisor(supervisor, Duration::from_millis(250));

        let (tx, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            let _ = tx.send(true);
        });

        let summaries = runtime.run(rx).await;
        stopper.await.unwrap();

        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.ticks >= 2));
        assert_eq!(log.len(), 2);

        let traffic = summaries.iter().find(|s| s.kind == AgentKind::Traffic).unwrap();
        assert_eq!(traffic.memory.traffic_phase, TrafficPhase::Ew);
        let rail = summaries.iter().find(|s| s.kind == AgentKind::Rail).unwrap();
        assert_eq!(rail.memory.barrier, BarrierPosition::Closed);

        assert!(metrics.to_prometheus_text().contains("cc_supervisor_checks_total"));
    }

    #[tokio::test]
    async fn test_already_stopped_runtime_returns_immediately() {
        let (pipeline, _log) = pipeline(PipelineMetrics::new());
        let (_tx, rx) = watch::channel(true);
        let summaries = ControlRuntime::new(pipeline).run(rx).await;
        assert!(summaries.iter().all(|s| s.ticks == 0));
    }
}
