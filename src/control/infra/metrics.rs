//! Prometheus Metrics for the control pipeline
//!
//! Key metric categories:
//! - **Ingest**: Measurements accepted and dropped, pending queue depth
//! - **Decisions**: Decisions by source, inference failures by route
//! - **Actuation**: Failed actuation calls
//! - **Consensus**: Anchors confirmed, pending, skipped, and late receipts
//! - **Supervisor**: Checks run and anomalies raised

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::types::{AgentKind, DecisionSource};

/// One counter per agent kind.
#[derive(Default)]
struct PerKind([AtomicU64; 2]);

impl PerKind {
    fn slot(kind: AgentKind) -> usize {
        match kind {
            AgentKind::Traffic => 0,
            AgentKind::Rail => 1,
        }
    }

    fn inc(&self, kind: AgentKind) {
        self.0[Self::slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    fn set(&self, kind: AgentKind, value: u64) {
        self.0[Self::slot(kind)].store(value, Ordering::Relaxed);
    }

    fn get(&self, kind: AgentKind) -> u64 {
        self.0[Self::slot(kind)].load(Ordering::Relaxed)
    }
}

/// Prometheus-compatible metrics collector.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct PipelineMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,
    measurements_ingested: PerKind,
    measurements_dropped: PerKind,
    pending_depth: PerKind,
    decisions_policy: PerKind,
    decisions_fallback: PerKind,
    inference_failures: PerKind,
    observation_failures: PerKind,
    actuation_failures: PerKind,
    anchors_confirmed: AtomicU64,
    anchors_pending: AtomicU64,
    anchors_skipped: AtomicU64,
    late_receipts: AtomicU64,
    supervisor_checks: AtomicU64,
    supervisor_anomalies: AtomicU64,
}

/// Point-in-time copy of the decision counters for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCounters {
    pub ingested: u64,
    pub dropped: u64,
    pub policy: u64,
    pub fallback: u64,
    pub inference_failures: u64,
    pub actuation_failures: u64,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                measurements_ingested: PerKind::default(),
                measurements_dropped: PerKind::default(),
                pending_depth: PerKind::default(),
                decisions_policy: PerKind::default(),
                decisions_fallback: PerKind::default(),
                inference_failures: PerKind::default(),
                observation_failures: PerKind::default(),
                actuation_failures: PerKind::default(),
                anchors_confirmed: AtomicU64::new(0),
                anchors_pending: AtomicU64::new(0),
                anchors_skipped: AtomicU64::new(0),
                late_receipts: AtomicU64::new(0),
                supervisor_checks: AtomicU64::new(0),
                supervisor_anomalies: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_ingest(&self, kind: AgentKind) {
        self.inner.measurements_ingested.inc(kind);
    }

    pub fn record_drop(&self, kind: AgentKind) {
        self.inner.measurements_dropped.inc(kind);
    }

    pub fn set_pending_depth(&self, kind: AgentKind, depth: usize) {
        self.inner.pending_depth.set(kind, depth as u64);
    }

    pub fn record_decision(&self, kind: AgentKind, source: DecisionSource) {
        match source {
            DecisionSource::Policy => self.inner.decisions_policy.inc(kind),
            DecisionSource::Fallback => self.inner.decisions_fallback.inc(kind),
        }
    }

    pub fn record_inference_failure(&self, kind: AgentKind) {
        self.inner.inference_failures.inc(kind);
    }

    pub fn record_observation_failure(&self, kind: AgentKind) {
        self.inner.observation_failures.inc(kind);
    }

    pub fn record_actuation_failure(&self, kind: AgentKind) {
        self.inner.actuation_failures.inc(kind);
    }

    pub fn record_anchor_confirmed(&self) {
        self.inner.anchors_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anchor_pending(&self) {
        self.inner.anchors_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anchor_skipped(&self) {
        self.inner.anchors_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_receipt(&self) {
        self.inner.late_receipts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_supervisor_check(&self, anomalies: usize) {
        self.inner.supervisor_checks.fetch_add(1, Ordering::Relaxed);
        self.inner
            .supervisor_anomalies
            .fetch_add(anomalies as u64, Ordering::Relaxed);
    }

    pub fn kind_counters(&self, kind: AgentKind) -> KindCounters {
        KindCounters {
            ingested: self.inner.measurements_ingested.get(kind),
            dropped: self.inner.measurements_dropped.get(kind),
            policy: self.inner.decisions_policy.get(kind),
            fallback: self.inner.decisions_fallback.get(kind),
            inference_failures: self.inner.inference_failures.get(kind),
            actuation_failures: self.inner.actuation_failures.get(kind),
        }
    }

    pub fn anchors(&self) -> (u64, u64, u64) {
        (
            self.inner.anchors_confirmed.load(Ordering::Relaxed),
            self.inner.anchors_pending.load(Ordering::Relaxed),
            self.inner.anchors_skipped.load(Ordering::Relaxed),
        )
    }

    /// Get all metrics as Prometheus text format.
    pub fn to_prometheus_text(&self) -> String {
        let mut output = String::with_capacity(2048);

        let per_kind: [(&str, &str, &str, &PerKind); 8] = [
            ("cc_measurements_ingested_total", "counter", "Measurements accepted by the store", &self.inner.measurements_ingested),
            ("cc_measurements_dropped_total", "counter", "Pending measurements dropped at capacity", &self.inner.measurements_dropped),
            ("cc_pending_depth", "gauge", "Pending measurements awaiting a tick", &self.inner.pending_depth),
            ("cc_decisions_policy_total", "counter", "Decisions produced by an inference route", &self.inner.decisions_policy),
            ("cc_decisions_fallback_total", "counter", "Decisions produced by the fallback rule", &self.inner.decisions_fallback),
            ("cc_inference_failures_total", "counter", "Failed inference route attempts", &self.inner.inference_failures),
            ("cc_observation_failures_total", "counter", "Measurements that could not form an observation", &self.inner.observation_failures),
            ("cc_actuation_failures_total", "counter", "Failed actuation calls", &self.inner.actuation_failures),
        ];

        for (name, kind_str, help, counter) in per_kind {
            output.push_str(&format!("# HELP {name} {help}\n# TYPE {name} {kind_str}\n"));
            for kind in AgentKind::ALL {
                output.push_str(&format!("{name}{{agent=\"{kind}\"}} {}\n", counter.get(kind)));
            }
        }

        let scalars: [(&str, &str, u64); 6] = [
            ("cc_anchors_confirmed_total", "Anchors confirmed within the wait budget", self.inner.anchors_confirmed.load(Ordering::Relaxed)),
            ("cc_anchors_pending_total", "Anchors still pending when the budget elapsed", self.inner.anchors_pending.load(Ordering::Relaxed)),
            ("cc_anchors_skipped_total", "Anchors skipped after a ledger error", self.inner.anchors_skipped.load(Ordering::Relaxed)),
            ("cc_late_receipts_total", "Receipts applied after the wait budget", self.inner.late_receipts.load(Ordering::Relaxed)),
            ("cc_supervisor_checks_total", "Supervisor checks run", self.inner.supervisor_checks.load(Ordering::Relaxed)),
            ("cc_supervisor_anomalies_total", "Anomalies raised by the supervisor", self.inner.supervisor_anomalies.load(Ordering::Relaxed)),
        ];

        for (name, help, value) in scalars {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }

        output.push_str(&format!(
            "# HELP cc_uptime_seconds Process uptime\n# TYPE cc_uptime_seconds gauge\ncc_uptime_seconds {}\n",
            self.inner.start_time.elapsed().as_secs_f64()
        ));

        output
    }
}
