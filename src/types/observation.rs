use serde::{Deserialize, Serialize};

/// Numeric snapshot of a junction, fed to the oracle or the fallback rule.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TrafficObservation {
    pub queue_ns: f64,
    pub queue_ew: f64,
    pub wait_ns: f64,
    pub wait_ew: f64,
    /// 1.0 when the remembered phase is north-south green
    pub is_ns_green: f64,
    /// Cycle progress in [0, 1]
    pub progress: f64,
}

/// Numeric snapshot of a rail crossing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RailObservation {
    pub eta_ms: f64,
    /// 1.0 when the remembered barrier position is closed
    pub barrier_closed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Observation {
    Traffic(TrafficObservation),
    Rail(RailObservation),
}
