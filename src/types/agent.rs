//! Agent kinds and the phase state remembered between ticks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// One of the two control domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Road traffic signal controller
    Traffic,
    /// Rail crossing barrier controller
    Rail,
}

impl AgentKind {
    pub const ALL: [AgentKind; 2] = [AgentKind::Traffic, AgentKind::Rail];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Traffic => "traffic",
            AgentKind::Rail => "rail",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "traffic" => Ok(AgentKind::Traffic),
            "rail" => Ok(AgentKind::Rail),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Which traffic approach was last commanded green.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrafficPhase {
    #[default]
    Ns,
    Ew,
}

/// Last commanded barrier position, collapsed to the two settled states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BarrierPosition {
    #[default]
    Open,
    Closed,
}

/// Phase state carried between ticks by one pipeline instance.
///
/// Starts at `NS` / `OPEN`. Updated from every produced outcome, including
/// fallback outcomes, so the next observation reflects what was commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseMemory {
    pub traffic_phase: TrafficPhase,
    pub barrier: BarrierPosition,
}

impl PhaseMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_parse_case_insensitive() {
        assert_eq!("Traffic".parse::<AgentKind>().unwrap(), AgentKind::Traffic);
        assert_eq!(" rail ".parse::<AgentKind>().unwrap(), AgentKind::Rail);
        assert!(matches!(
            "tram".parse::<AgentKind>(),
            Err(ValidationError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_phase_memory_initial_state() {
        let memory = PhaseMemory::new();
        assert_eq!(memory.traffic_phase, TrafficPhase::Ns);
        assert_eq!(memory.barrier, BarrierPosition::Open);
    }
}
