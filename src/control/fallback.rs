//! Deterministic fallback rule used when no inference route answers.
//!
//! Pure functions of the observation and the configured thresholds:
//! - Traffic: the longer queue gets green (ties go north-south); the long
//!   green is used when the peak queue exceeds the threshold.
//! - Rail: close when the train is within the close lead, else open.

use crate::control::config::FallbackConfig;
use crate::types::{
    BarrierCommand, BarrierState, Observation, Outcome, RailObservation, TrafficObservation,
    TrafficPhase, TrafficPlan,
};

/// Non-finite or negative readings count as zero.
fn sanitize(n: f64) -> f64 {
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    config: FallbackConfig,
}

impl FallbackPolicy {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    pub fn traffic_plan(&self, queue_ns: f64, queue_ew: f64) -> TrafficPlan {
        let (ns, ew) = (sanitize(queue_ns), sanitize(queue_ew));
        let dominant = if ns >= ew {
            TrafficPhase::Ns
        } else {
            TrafficPhase::Ew
        };
        let peak = ns.max(ew);
        let duration = if peak > self.config.queue_threshold {
            self.config.long_green_sec
        } else {
            self.config.short_green_sec
        };
        TrafficPlan::green_for(dominant, duration)
    }

    pub fn barrier_command(&self, eta_ms: f64) -> BarrierCommand {
        let state = if sanitize(eta_ms) <= self.config.close_lead_ms {
            BarrierState::Closed
        } else {
            BarrierState::Open
        };
        BarrierCommand { state }
    }

    /// Outcome plus the name of the rule branch that produced it.
    pub fn decide(&self, observation: &Observation) -> (Outcome, &'static str) {
        match observation {
            Observation::Traffic(TrafficObservation {
                queue_ns, queue_ew, ..
            }) => {
                let plan = self.traffic_plan(*queue_ns, *queue_ew);
                let rule = if sanitize(*queue_ns).max(sanitize(*queue_ew)) > self.config.queue_threshold {
                    "dominant_queue_long_green"
                } else {
                    "dominant_queue_short_green"
                };
                (Outcome::Traffic(plan), rule)
            }
            Observation::Rail(RailObservation { eta_ms, .. }) => {
                let command = self.barrier_command(*eta_ms);
                let rule = match command.state {
                    BarrierState::Closed => "eta_within_close_lead",
                    _ => "eta_beyond_close_lead",
                };
                (Outcome::Rail(command), rule)
            }
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(FallbackConfig::default())
    }
}
