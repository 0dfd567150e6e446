//! Per-kind measurement buffers.
//!
//! Each agent kind owns three independent projections:
//! - a bounded pending FIFO, drained destructively by the pipeline
//! - a recent-history ring (newest kept, oldest dropped)
//! - a latest-value-per-location map (overwritten on ingest)
//!
//! Only `dequeue_next` removes from the pending FIFO. History and latest are
//! read-mostly views that dequeue never touches.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::extract::extract_metric;
use crate::control::config::RetentionConfig;
use crate::control::infra::{targets, PipelineMetrics};
use crate::errors::ValidationError;
use crate::types::{now_ms, AgentKind, IngestRequest, Measurement, TimestampMs};

#[derive(Debug, Default)]
struct KindBuffer {
    pending: VecDeque<Measurement>,
    history: VecDeque<Measurement>,
    latest: HashMap<String, Measurement>,
}

/// Read-only view returned by [`MeasurementStore::snapshot`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeasurementSnapshot {
    /// Latest measurement per location, newest first
    pub latest: Vec<Measurement>,
    /// Recent history, newest first
    pub history: Vec<Measurement>,
}

pub struct MeasurementStore {
    history_capacity: usize,
    pending_capacity: usize,
    buffers: [Mutex<KindBuffer>; 2],
    metrics: Option<PipelineMetrics>,
}

impl MeasurementStore {
    pub fn new(retention: &RetentionConfig) -> Self {
        Self::with_capacities(retention.history_capacity, retention.pending_capacity)
    }

    pub fn with_capacities(history_capacity: usize, pending_capacity: usize) -> Self {
        Self {
            history_capacity: history_capacity.max(1),
            pending_capacity: pending_capacity.max(1),
            buffers: [Mutex::default(), Mutex::default()],
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn buffer(&self, kind: AgentKind) -> MutexGuard<'_, KindBuffer> {
        let slot = match kind {
            AgentKind::Traffic => 0,
            AgentKind::Rail => 1,
        };
        self.buffers[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a measurement.
    ///
    /// Rejects a blank location or a null value. `ts` defaults to now.
    pub fn ingest(
        &self,
        kind: AgentKind,
        location: &str,
        value: Value,
        ts: Option<TimestampMs>,
    ) -> Result<Measurement, ValidationError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ValidationError::MissingLocation);
        }
        if value.is_null() {
            return Err(ValidationError::MissingValue);
        }

        let measurement = Measurement {
            kind,
            location: location.to_string(),
            metric: extract_metric(kind, &value),
            value,
            ts: ts.unwrap_or_else(now_ms),
        };

        let (dropped, depth) = {
            let mut buffer = self.buffer(kind);

            let dropped = if buffer.pending.len() >= self.pending_capacity {
                buffer.pending.pop_front()
            } else {
                None
            };
            buffer.pending.push_back(measurement.clone());

            buffer.history.push_back(measurement.clone());
            while buffer.history.len() > self.history_capacity {
                buffer.history.pop_front();
            }

            buffer
                .latest
                .insert(measurement.location.clone(), measurement.clone());

            (dropped, buffer.pending.len())
        };

        if let Some(dropped) = dropped {
            warn!(
                target: targets::STORE,
                agent = %kind,
                location = %dropped.location,
                ts = dropped.ts,
                capacity = self.pending_capacity,
                "Pending queue full, dropped oldest measurement"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_drop(kind);
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_ingest(kind);
            metrics.set_pending_depth(kind, depth);
        }

        debug!(
            target: targets::STORE,
            agent = %kind,
            location = %measurement.location,
            metric = ?measurement.metric,
            pending = depth,
            "Measurement ingested"
        );

        Ok(measurement)
    }

    /// Accept a raw ingest payload from the ingestion boundary.
    pub fn ingest_request(&self, request: IngestRequest) -> Result<Measurement, ValidationError> {
        let location = request.location.ok_or(ValidationError::MissingLocation)?;
        let value = request.value.ok_or(ValidationError::MissingValue)?;
        self.ingest(request.kind, &location, value, request.ts)
    }

    /// Remove and return the oldest pending measurement of `kind`.
    ///
    /// The pop happens under the kind's lock, so concurrent consumers never
    /// receive the same measurement.
    pub fn dequeue_next(&self, kind: AgentKind) -> Option<Measurement> {
        let (next, depth) = {
            let mut buffer = self.buffer(kind);
            let next = buffer.pending.pop_front();
            (next, buffer.pending.len())
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_pending_depth(kind, depth);
        }
        next
    }

    pub fn pending_len(&self, kind: AgentKind) -> usize {
        self.buffer(kind).pending.len()
    }

    /// Latest-per-location and recent history, each truncated to `limit`.
    pub fn snapshot(&self, kind: AgentKind, limit: usize) -> MeasurementSnapshot {
        let buffer = self.buffer(kind);

        let mut latest: Vec<Measurement> = buffer.latest.values().cloned().collect();
        latest.sort_by(|a, b| b.ts.cmp(&a.ts).then_with(|| a.location.cmp(&b.location)));
        latest.truncate(limit);

        let history = buffer.history.iter().rev().take(limit).cloned().collect();

        MeasurementSnapshot { latest, history }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> MeasurementStore {
        MeasurementStore::with_capacities(200, 1000)
    }

    #[test]
    fn test_dequeue_is_fifo_and_at_most_once() {
        let store = store();
        for i in 0..5 {
            store
                .ingest(AgentKind::Rail, "crossing", json!({"etaMs": i * 1000}), Some(i))
                .unwrap();
        }
        let drained: Vec<i64> = std::iter::from_fn(|| store.dequeue_next(AgentKind::Rail))
            .map(|m| m.ts)
            .collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(store.dequeue_next(AgentKind::Rail).is_none());
    }

    #[test]
    fn test_kinds_are_independent() {
        let store = store();
        store
            .ingest(AgentKind::Traffic, "junction-central", json!({"queue": 3}), Some(1))
            .unwrap();
        assert!(store.dequeue_next(AgentKind::Rail).is_none());
        assert!(store.dequeue_next(AgentKind::Traffic).is_some());
    }

    #[test]
    fn test_snapshot_does_not_deplete_pending() {
        let store = store();
        store
            .ingest(AgentKind::Traffic, "a", json!({"queue": 1}), Some(10))
            .unwrap();
        store
            .ingest(AgentKind::Traffic, "b", json!({"queue": 2}), Some(20))
            .unwrap();

        let snap = store.snapshot(AgentKind::Traffic, 10);
        assert_eq!(snap.history.len(), 2);
        assert_eq!(store.pending_len(AgentKind::Traffic), 2);

        // Dequeue leaves the projections intact
        store.dequeue_next(AgentKind::Traffic);
        store.dequeue_next(AgentKind::Traffic);
        let snap = store.snapshot(AgentKind::Traffic, 10);
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.latest.len(), 2);
    }

    #[test]
    fn test_latest_reflects_most_recent_ingest_per_location() {
        let store = store();
        store
            .ingest(AgentKind::Traffic, "junction-north", json!({"queue": 5}), Some(100))
            .unwrap();
        store
            .ingest(AgentKind::Traffic, "junction-west", json!({"queue": 7}), Some(150))
            .unwrap();
        store
            .ingest(AgentKind::Traffic, "junction-north", json!({"queue": 9}), Some(200))
            .unwrap();

        let snap = store.snapshot(AgentKind::Traffic, 10);
        assert_eq!(snap.latest.len(), 2);
        assert_eq!(snap.latest[0].location, "junction-north");
        assert_eq!(snap.latest[0].metric, Some(9.0));
        assert_eq!(snap.latest[1].location, "junction-west");
        // history is newest first
        assert_eq!(snap.history[0].ts, 200);
    }

    #[test]
    fn test_history_ring_drops_oldest() {
        let store = MeasurementStore::with_capacities(3, 100);
        for i in 0..5 {
            store
                .ingest(AgentKind::Rail, "x", json!({"etaMs": i}), Some(i))
                .unwrap();
        }
        let snap = store.snapshot(AgentKind::Rail, 10);
        let ts: Vec<i64> = snap.history.iter().map(|m| m.ts).collect();
        assert_eq!(ts, vec![4, 3, 2]);
        // pending queue still holds everything
        assert_eq!(store.pending_len(AgentKind::Rail), 5);
    }

    #[test]
    fn test_pending_capacity_drops_oldest_pending() {
        let metrics = PipelineMetrics::new();
        let store = MeasurementStore::with_capacities(10, 2).with_metrics(metrics.clone());
        for i in 0..3 {
            store
                .ingest(AgentKind::Rail, "x", json!({"etaMs": i}), Some(i))
                .unwrap();
        }
        assert_eq!(store.dequeue_next(AgentKind::Rail).map(|m| m.ts), Some(1));
        assert_eq!(metrics.kind_counters(AgentKind::Rail).dropped, 1);
        assert_eq!(metrics.kind_counters(AgentKind::Rail).ingested, 3);
    }

    #[test]
    fn test_ingest_validation() {
        let store = store();
        assert_eq!(
            store.ingest(AgentKind::Rail, "  ", json!({"etaMs": 1}), None),
            Err(ValidationError::MissingLocation)
        );
        assert_eq!(
            store.ingest(AgentKind::Rail, "x", Value::Null, None),
            Err(ValidationError::MissingValue)
        );
        let request = IngestRequest {
            kind: AgentKind::Traffic,
            location: None,
            value: Some(json!({})),
            ts: None,
        };
        assert_eq!(
            store.ingest_request(request),
            Err(ValidationError::MissingLocation)
        );
        assert_eq!(store.pending_len(AgentKind::Rail), 0);
    }

    #[test]
    fn test_concurrent_consumers_never_share_an_item() {
        let store = Arc::new(store());
        for i in 0..400 {
            store
                .ingest(AgentKind::Traffic, "j", json!({"queue": 1}), Some(i))
                .unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(m) = store.dequeue_next(AgentKind::Traffic) {
                        seen.push(m.ts);
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }
}
