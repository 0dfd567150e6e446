//! Observation building from a measurement payload plus remembered phase state.

use serde_json::{Map, Value};

use crate::control::measurement::extract::{as_number, first_field, rail_eta_ms};
use crate::errors::ObservationError;
use crate::types::{
    AgentKind, BarrierPosition, Measurement, Observation, PhaseMemory, RailObservation,
    TrafficObservation, TrafficPhase,
};

const QUEUE_NS_KEYS: &[&str] = &["queue_ns", "queueNs", "avg_queue_len_NS", "avg_queue_len_ns"];
const QUEUE_EW_KEYS: &[&str] = &[
    "queue_ew",
    "queueEw",
    "avg_queue_len_EW",
    "avg_queue_len_ew",
    "queue_eo",
    "avg_queue_len_EO",
];
const WAIT_NS_KEYS: &[&str] = &["wait_ns", "waitNs", "wait_time_NS", "wait_time_ns"];
const WAIT_EW_KEYS: &[&str] = &["wait_ew", "waitEw", "wait_time_EW", "wait_time_ew", "wait_eo", "wait_time_EO"];
const PROGRESS_KEYS: &[&str] = &["progress", "cycle_progress"];

/// Read one numeric field. `Ok(None)` when absent.
fn number(obj: &Map<String, Value>, keys: &[&str], field: &'static str) -> Result<Option<f64>, ObservationError> {
    let Some(raw) = first_field(obj, keys) else {
        return Ok(None);
    };
    let n = as_number(raw).ok_or(ObservationError::NonFinite(field))?;
    if n < 0.0 {
        return Err(ObservationError::Negative(field));
    }
    Ok(Some(n))
}

fn required(obj: &Map<String, Value>, keys: &[&str], field: &'static str) -> Result<f64, ObservationError> {
    number(obj, keys, field)?.ok_or(ObservationError::MissingField(field))
}

fn phase_flag(memory: &PhaseMemory) -> f64 {
    match memory.traffic_phase {
        TrafficPhase::Ns => 1.0,
        TrafficPhase::Ew => 0.0,
    }
}

fn barrier_flag(memory: &PhaseMemory) -> f64 {
    match memory.barrier {
        BarrierPosition::Closed => 1.0,
        BarrierPosition::Open => 0.0,
    }
}

/// Strict observation for the inference routes.
///
/// Traffic needs both queue lengths; waits default to twice the queue and
/// progress to 0. Rail needs an ETA.
pub fn build_observation(
    kind: AgentKind,
    measurement: &Measurement,
    memory: &PhaseMemory,
) -> Result<Observation, ObservationError> {
    match kind {
        AgentKind::Traffic => {
            let empty = Map::new();
            let obj = measurement.value.as_object().unwrap_or(&empty);
            let queue_ns = required(obj, QUEUE_NS_KEYS, "queue_ns")?;
            let queue_ew = required(obj, QUEUE_EW_KEYS, "queue_ew")?;
            let wait_ns = number(obj, WAIT_NS_KEYS, "wait_ns")?.unwrap_or(queue_ns * 2.0);
            let wait_ew = number(obj, WAIT_EW_KEYS, "wait_ew")?.unwrap_or(queue_ew * 2.0);
            let progress = number(obj, PROGRESS_KEYS, "progress")?
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            Ok(Observation::Traffic(TrafficObservation {
                queue_ns,
                queue_ew,
                wait_ns,
                wait_ew,
                is_ns_green: phase_flag(memory),
                progress,
            }))
        }
        AgentKind::Rail => {
            let eta_ms = match rail_eta_ms(&measurement.value) {
                Some(eta) if eta < 0.0 => return Err(ObservationError::Negative("eta_ms")),
                Some(eta) => eta,
                None if has_eta_key(&measurement.value) => {
                    return Err(ObservationError::NonFinite("eta_ms"))
                }
                None => return Err(ObservationError::MissingField("eta_ms")),
            };
            Ok(Observation::Rail(RailObservation {
                eta_ms,
                barrier_closed: barrier_flag(memory),
            }))
        }
    }
}

fn has_eta_key(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.keys().any(|k| k.to_lowercase().starts_with("eta")))
}

/// Observation for the fallback rule when the strict build failed.
///
/// Unreadable numbers become 0, which makes an unknown ETA close the barrier.
pub fn lenient_observation(kind: AgentKind, measurement: &Measurement, memory: &PhaseMemory) -> Observation {
    let empty = Map::new();
    let obj = measurement.value.as_object().unwrap_or(&empty);
    let read = |keys: &[&str], field: &'static str| number(obj, keys, field).ok().flatten().unwrap_or(0.0);

    match kind {
        AgentKind::Traffic => {
            let queue_ns = read(QUEUE_NS_KEYS, "queue_ns");
            let queue_ew = read(QUEUE_EW_KEYS, "queue_ew");
            Observation::Traffic(TrafficObservation {
                queue_ns,
                queue_ew,
                wait_ns: number(obj, WAIT_NS_KEYS, "wait_ns").ok().flatten().unwrap_or(queue_ns * 2.0),
                wait_ew: number(obj, WAIT_EW_KEYS, "wait_ew").ok().flatten().unwrap_or(queue_ew * 2.0),
                is_ns_green: phase_flag(memory),
                progress: read(PROGRESS_KEYS, "progress").clamp(0.0, 1.0),
            })
        }
        AgentKind::Rail => Observation::Rail(RailObservation {
            eta_ms: rail_eta_ms(&measurement.value)
                .filter(|eta| *eta >= 0.0)
                .unwrap_or(0.0),
            barrier_closed: barrier_flag(memory),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn measurement(kind: AgentKind, value: Value) -> Measurement {
        Measurement {
            kind,
            location: "junction-1".into(),
            value,
            metric: None,
            ts: 1,
        }
    }

    #[test]
    fn test_traffic_defaults_from_queue() {
        let m = measurement(
            AgentKind::Traffic,
            json!({"avg_queue_len_NS": 25, "avg_queue_len_EW": 10}),
        );
        let obs = build_observation(AgentKind::Traffic, &m, &PhaseMemory::new()).unwrap();
        assert_eq!(
            obs,
            Observation::Traffic(TrafficObservation {
                queue_ns: 25.0,
                queue_ew: 10.0,
                wait_ns: 50.0,
                wait_ew: 20.0,
                is_ns_green: 1.0,
                progress: 0.0,
            })
        );
    }

    #[test]
    fn test_traffic_phase_flag_follows_memory() {
        let m = measurement(
            AgentKind::Traffic,
            json!({"queue_ns": 1, "queue_ew": 2, "wait_time_NS": 3, "progress": 0.4}),
        );
        let memory = PhaseMemory {
            traffic_phase: TrafficPhase::Ew,
            ..PhaseMemory::default()
        };
        let Observation::Traffic(obs) = build_observation(AgentKind::Traffic, &m, &memory).unwrap() else {
            panic!("expected traffic observation");
        };
        assert_eq!(obs.is_ns_green, 0.0);
        assert_eq!(obs.wait_ns, 3.0);
        assert_eq!(obs.progress, 0.4);
    }

    #[test]
    fn test_traffic_missing_queue_fails() {
        let m = measurement(AgentKind::Traffic, json!({"queue_ns": 4}));
        let err = build_observation(AgentKind::Traffic, &m, &PhaseMemory::new()).unwrap_err();
        assert_eq!(err, ObservationError::MissingField("queue_ew"));
        assert_eq!(err.reason_code(), "observation_missing:queue_ew");
    }

    #[test]
    fn test_traffic_rejects_bad_numbers() {
        let m = measurement(AgentKind::Traffic, json!({"queue_ns": "lots", "queue_ew": 1}));
        assert_eq!(
            build_observation(AgentKind::Traffic, &m, &PhaseMemory::new()).unwrap_err(),
            ObservationError::NonFinite("queue_ns")
        );
        let m = measurement(AgentKind::Traffic, json!({"queue_ns": -3, "queue_ew": 1}));
        assert_eq!(
            build_observation(AgentKind::Traffic, &m, &PhaseMemory::new()).unwrap_err(),
            ObservationError::Negative("queue_ns")
        );
    }

    #[test]
    fn test_rail_eta_and_barrier_flag() {
        let m = measurement(AgentKind::Rail, json!({"etaMs": 18000, "pattern": "express"}));
        let memory = PhaseMemory {
            barrier: BarrierPosition::Closed,
            ..PhaseMemory::default()
        };
        let obs = build_observation(AgentKind::Rail, &m, &memory).unwrap();
        assert_eq!(
            obs,
            Observation::Rail(RailObservation {
                eta_ms: 18000.0,
                barrier_closed: 1.0
            })
        );
    }

    #[test]
    fn test_rail_missing_eta() {
        let m = measurement(AgentKind::Rail, json!({"pattern": "freight"}));
        assert_eq!(
            build_observation(AgentKind::Rail, &m, &PhaseMemory::new()).unwrap_err(),
            ObservationError::MissingField("eta_ms")
        );
        let m = measurement(AgentKind::Rail, json!({"etaMs": "soon"}));
        assert_eq!(
            build_observation(AgentKind::Rail, &m, &PhaseMemory::new()).unwrap_err(),
            ObservationError::NonFinite("eta_ms")
        );
    }

    #[test]
    fn test_lenient_unknown_eta_is_zero() {
        let m = measurement(AgentKind::Rail, json!({"pattern": "freight"}));
        let obs = lenient_observation(AgentKind::Rail, &m, &PhaseMemory::new());
        assert_eq!(
            obs,
            Observation::Rail(RailObservation {
                eta_ms: 0.0,
                barrier_closed: 0.0
            })
        );
    }

    #[test]
    fn test_lenient_traffic_keeps_readable_fields() {
        let m = measurement(AgentKind::Traffic, json!({"queue_ns": 30, "queue_ew": "n/a"}));
        let Observation::Traffic(obs) = lenient_observation(AgentKind::Traffic, &m, &PhaseMemory::new()) else {
            panic!("expected traffic observation");
        };
        assert_eq!(obs.queue_ns, 30.0);
        assert_eq!(obs.queue_ew, 0.0);
        assert_eq!(obs.wait_ns, 60.0);
    }
}
