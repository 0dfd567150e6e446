//! Control commands produced by a decision.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{BarrierPosition, TrafficPhase};

/// Three-phase signal aspect for one approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    Green,
    Yellow,
    Red,
}

impl FromStr for SignalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "green" => Ok(SignalState::Green),
            "yellow" | "amber" => Ok(SignalState::Yellow),
            "red" => Ok(SignalState::Red),
            other => Err(format!("unknown signal state '{other}'")),
        }
    }
}

/// Signal plan for a two-approach junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrafficPlan {
    /// North-south approach
    pub ns: SignalState,
    /// East-west approach
    #[serde(alias = "eo")]
    pub ew: SignalState,
    /// Green duration in seconds (always positive)
    #[serde(rename = "durationSec")]
    pub duration_sec: u32,
}

impl TrafficPlan {
    /// Plan giving green to `phase` and red to the other approach.
    pub fn green_for(phase: TrafficPhase, duration_sec: u32) -> Self {
        match phase {
            TrafficPhase::Ns => Self {
                ns: SignalState::Green,
                ew: SignalState::Red,
                duration_sec,
            },
            TrafficPhase::Ew => Self {
                ns: SignalState::Red,
                ew: SignalState::Green,
                duration_sec,
            },
        }
    }

    /// Approach that holds green, if any.
    pub fn green_phase(&self) -> Option<TrafficPhase> {
        if self.ns == SignalState::Green {
            Some(TrafficPhase::Ns)
        } else if self.ew == SignalState::Green {
            Some(TrafficPhase::Ew)
        } else {
            None
        }
    }
}

/// Four-state barrier command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BarrierState {
    Open,
    Closed,
    Opening,
    Closing,
}

impl BarrierState {
    /// Settled position this command leads to.
    pub fn position(&self) -> BarrierPosition {
        match self {
            BarrierState::Open | BarrierState::Opening => BarrierPosition::Open,
            BarrierState::Closed | BarrierState::Closing => BarrierPosition::Closed,
        }
    }
}

impl FromStr for BarrierState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(BarrierState::Open),
            "CLOSED" => Ok(BarrierState::Closed),
            "OPENING" => Ok(BarrierState::Opening),
            "CLOSING" => Ok(BarrierState::Closing),
            other => Err(format!("unknown barrier state '{other}'")),
        }
    }
}

/// Barrier command for a rail crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BarrierCommand {
    pub state: BarrierState,
}

/// Produced control command, one variant per agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Traffic(TrafficPlan),
    Rail(BarrierCommand),
}

impl Outcome {
    pub fn as_traffic(&self) -> Option<&TrafficPlan> {
        match self {
            Outcome::Traffic(plan) => Some(plan),
            Outcome::Rail(_) => None,
        }
    }

    pub fn as_rail(&self) -> Option<&BarrierCommand> {
        match self {
            Outcome::Rail(cmd) => Some(cmd),
            Outcome::Traffic(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_plan_wire_shape() {
        let plan = TrafficPlan::green_for(TrafficPhase::Ns, 30);
        let json = serde_json::to_value(plan).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ns": "green", "ew": "red", "durationSec": 30})
        );
    }

    #[test]
    fn test_traffic_plan_accepts_eo_alias() {
        let plan: TrafficPlan =
            serde_json::from_value(serde_json::json!({"ns": "red", "eo": "green", "durationSec": 20}))
                .unwrap();
        assert_eq!(plan.green_phase(), Some(TrafficPhase::Ew));
    }

    #[test]
    fn test_barrier_state_positions() {
        assert_eq!(BarrierState::Closing.position(), BarrierPosition::Closed);
        assert_eq!(BarrierState::Opening.position(), BarrierPosition::Open);
        assert_eq!("closed".parse::<BarrierState>().unwrap(), BarrierState::Closed);
    }

    #[test]
    fn test_outcome_untagged_deserialize() {
        let rail: Outcome = serde_json::from_str(r#"{"state":"CLOSED"}"#).unwrap();
        assert!(rail.as_rail().is_some());
        let traffic: Outcome =
            serde_json::from_str(r#"{"ns":"green","ew":"red","durationSec":15}"#).unwrap();
        assert!(traffic.as_traffic().is_some());
    }
}
