//! Kind-specific field extraction from opaque sensor payloads.

use serde_json::{Map, Value};

use crate::types::AgentKind;

/// Substrings that mark a traffic field as a congestion-like reading.
const CONGESTION_HINTS: &[&str] = &["congestion", "queue", "wait", "occupancy", "density", "delay"];

/// Substrings that mark a traffic field as a 0-1 fraction.
const FRACTION_HINTS: &[&str] = &["progress", "utilization", "utilisation"];

/// ETA field names in milliseconds.
const ETA_MS_KEYS: &[&str] = &["etaMs", "eta_ms", "etaMS", "eta"];

/// ETA field names in seconds.
const ETA_SEC_KEYS: &[&str] = &["etaSec", "eta_sec", "eta_s"];

/// Interpret a JSON value as a finite number. Numeric strings are accepted.
pub fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// First present field among `keys`, returned raw so callers can tell
/// "absent" from "present but not a finite number".
pub fn first_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
}

/// Normalized scalar for a measurement payload.
pub fn extract_metric(kind: AgentKind, value: &Value) -> Option<f64> {
    match kind {
        AgentKind::Traffic => traffic_metric(value),
        AgentKind::Rail => rail_eta_ms(value),
    }
}

/// Peak congestion-like reading on a 0-100 scale.
///
/// Takes the max over every candidate field, so readings in different units
/// (vehicles queued, seconds waited) compete directly. Kept for
/// compatibility with existing sensor feeds; do not add more hints here.
fn traffic_metric(value: &Value) -> Option<f64> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => return as_number(other).filter(|n| *n >= 0.0),
    };

    obj.iter()
        .filter_map(|(key, raw)| {
            let key = key.to_lowercase();
            let n = as_number(raw)?;
            if n < 0.0 {
                return None;
            }
            if FRACTION_HINTS.iter().any(|hint| key.contains(hint)) {
                Some(if n <= 1.0 { n * 100.0 } else { n })
            } else if CONGESTION_HINTS.iter().any(|hint| key.contains(hint)) {
                Some(n)
            } else {
                None
            }
        })
        .fold(None, |best: Option<f64>, n| Some(best.map_or(n, |b| b.max(n))))
}

/// Train ETA in milliseconds.
pub fn rail_eta_ms(value: &Value) -> Option<f64> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => return as_number(other),
    };
    if let Some(ms) = first_field(obj, ETA_MS_KEYS).and_then(as_number) {
        return Some(ms);
    }
    first_field(obj, ETA_SEC_KEYS)
        .and_then(as_number)
        .map(|secs| secs * 1000.0)
}
