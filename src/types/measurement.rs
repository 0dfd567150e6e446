use serde::{Deserialize, Serialize};

use super::{AgentKind, TimestampMs};

/// Raw ingest payload as it arrives at the ingestion boundary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestRequest {
    pub kind: AgentKind,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub ts: Option<TimestampMs>,
}

/// A sensor measurement held by the store.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Measurement {
    pub kind: AgentKind,
    pub location: String,
    /// Opaque sensor payload
    pub value: serde_json::Value,
    /// Normalized scalar derived from `value`; `None` when nothing usable was found
    pub metric: Option<f64>,
    pub ts: TimestampMs,
}
