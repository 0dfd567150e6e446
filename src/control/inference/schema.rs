//! Per-kind validation of oracle responses.
//!
//! Traffic outcomes must name a three-phase state for both approaches and a
//! positive duration; a plan that shows green to both approaches is rejected.
//! Rail outcomes must name one of the four barrier states.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::control::measurement::extract::{as_number, first_field};
use crate::errors::InferenceError;
use crate::types::{AgentKind, BarrierCommand, BarrierState, Outcome, SignalState, TrafficPlan};

/// Validated oracle answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub outcome: Outcome,
    pub action_index: Option<i64>,
    pub confidence: Option<f64>,
    pub policy_metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(alias = "plan", alias = "command")]
    outcome: Option<Value>,
    #[serde(default, rename = "actionIndex", alias = "action_index")]
    action_index: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default, rename = "policyMetadata", alias = "policy_metadata")]
    policy_metadata: Option<Value>,
}

fn invalid(msg: impl Into<String>) -> InferenceError {
    InferenceError::InvalidResponse(msg.into())
}

/// Validate a raw oracle body against the schema for `kind`.
pub fn validate_response(kind: AgentKind, body: Value) -> Result<PolicyDecision, InferenceError> {
    let raw: RawResponse =
        serde_json::from_value(body).map_err(|e| invalid(format!("response shape: {e}")))?;

    let outcome_value = raw.outcome.ok_or_else(|| invalid("missing outcome"))?;
    let outcome = match kind {
        AgentKind::Traffic => Outcome::Traffic(validate_traffic_plan(&outcome_value)?),
        AgentKind::Rail => Outcome::Rail(validate_barrier_command(&outcome_value)?),
    };

    let action_index = match raw.action_index {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| invalid(format!("actionIndex is not an integer: {v}")))?,
        ),
    };

    let confidence = match raw.confidence {
        None | Some(Value::Null) => None,
        Some(v) => {
            let c = as_number(&v).ok_or_else(|| invalid(format!("confidence is not a number: {v}")))?;
            if !(0.0..=1.0).contains(&c) {
                return Err(invalid(format!("confidence {c} outside [0, 1]")));
            }
            Some(c)
        }
    };

    let policy_metadata = match raw.policy_metadata {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => return Err(invalid(format!("policyMetadata is not an object: {other}"))),
    };

    Ok(PolicyDecision {
        outcome,
        action_index,
        confidence,
        policy_metadata,
    })
}

fn signal_field(obj: &Map<String, Value>, keys: &[&str], label: &str) -> Result<SignalState, InferenceError> {
    let raw = first_field(obj, keys).ok_or_else(|| invalid(format!("missing {label} signal")))?;
    raw.as_str()
        .ok_or_else(|| invalid(format!("{label} signal is not a string")))?
        .parse()
        .map_err(invalid)
}

pub fn validate_traffic_plan(value: &Value) -> Result<TrafficPlan, InferenceError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("traffic plan is not an object"))?;

    let ns = signal_field(obj, &["ns"], "ns")?;
    let ew = signal_field(obj, &["ew", "eo"], "ew")?;

    let duration = first_field(obj, &["durationSec", "duration_sec", "duration"])
        .ok_or_else(|| invalid("missing durationSec"))?;
    let duration = as_number(duration).ok_or_else(|| invalid("durationSec is not a number"))?;
    if duration <= 0.0 || duration > f64::from(u32::MAX) {
        return Err(invalid(format!("durationSec {duration} is not positive")));
    }

    if ns == SignalState::Green && ew == SignalState::Green {
        return Err(invalid("conflicting plan: both approaches green"));
    }

    Ok(TrafficPlan {
        ns,
        ew,
        duration_sec: (duration.round() as u32).max(1),
    })
}

pub fn validate_barrier_command(value: &Value) -> Result<BarrierCommand, InferenceError> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => first_field(obj, &["state", "barrier_state", "barrierState"])
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing barrier state"))?,
        _ => return Err(invalid("barrier command is not an object")),
    };
    let state: BarrierState = raw.parse().map_err(invalid)?;
    Ok(BarrierCommand { state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_traffic_response_with_plan_alias() {
        let decision = validate_response(
            AgentKind::Traffic,
            json!({
                "plan": {"ns": "green", "eo": "red", "durationSec": 20},
                "action_index": 1,
                "confidence": 0.73,
                "policy_metadata": {"model_path": "/models/traffic_policy.zip"}
            }),
        )
        .unwrap();
        assert_eq!(
            decision.outcome,
            Outcome::Traffic(TrafficPlan {
                ns: SignalState::Green,
                ew: SignalState::Red,
                duration_sec: 20
            })
        );
        assert_eq!(decision.action_index, Some(1));
        assert_eq!(decision.confidence, Some(0.73));
        assert!(decision.policy_metadata.unwrap().contains_key("model_path"));
    }

    #[test]
    fn test_rail_response_with_command_alias() {
        let decision = validate_response(
            AgentKind::Rail,
            json!({"command": {"state": "CLOSING"}, "actionIndex": 1, "confidence": 0.9}),
        )
        .unwrap();
        assert_eq!(
            decision.outcome,
            Outcome::Rail(BarrierCommand {
                state: BarrierState::Closing
            })
        );
    }

    #[test]
    fn test_rejects_unknown_barrier_state() {
        let err = validate_response(AgentKind::Rail, json!({"outcome": {"state": "HALF"}})).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidResponse(_)));
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let err = validate_traffic_plan(&json!({"ns": "green", "ew": "red", "durationSec": 0}))
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidResponse(_)));
    }

    #[test]
    fn test_rejects_both_green() {
        assert!(validate_traffic_plan(&json!({"ns": "green", "ew": "green", "durationSec": 10})).is_err());
    }

    #[test]
    fn test_rejects_wrong_kind_shape() {
        // A rail command is not a valid traffic plan
        assert!(validate_response(AgentKind::Traffic, json!({"outcome": {"state": "OPEN"}})).is_err());
        assert!(validate_response(AgentKind::Traffic, json!({"confidence": 0.5})).is_err());
        assert!(validate_response(AgentKind::Rail, json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let err = validate_response(
            AgentKind::Rail,
            json!({"outcome": {"state": "OPEN"}, "confidence": 1.7}),
        )
        .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidResponse(_)));
    }
}
