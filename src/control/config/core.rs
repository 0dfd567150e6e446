//! Core pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::AgentKind;

/// Tick cadence and per-kind batch limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Interval between ticks of each agent loop (ms)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Max traffic measurements processed per tick
    #[serde(default = "default_traffic_batch_limit")]
    pub traffic_batch_limit: usize,
    /// Max rail measurements processed per tick
    #[serde(default = "default_rail_batch_limit")]
    pub rail_batch_limit: usize,
}

fn default_tick_interval_ms() -> u64 {
    2000
}

/// Three junctions publishing ~2 events/s each fill roughly 12 slots per tick.
fn default_traffic_batch_limit() -> usize {
    16
}

fn default_rail_batch_limit() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            traffic_batch_limit: default_traffic_batch_limit(),
            rail_batch_limit: default_rail_batch_limit(),
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn batch_limit(&self, kind: AgentKind) -> usize {
        match kind {
            AgentKind::Traffic => self.traffic_batch_limit,
            AgentKind::Rail => self.rail_batch_limit,
        }
    }
}

/// Parameters of the deterministic fallback rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FallbackConfig {
    /// Peak queue length above which the long green is used
    #[serde(default = "default_queue_threshold")]
    pub queue_threshold: f64,
    /// Green duration when the peak queue is at or below threshold (s)
    #[serde(default = "default_short_green_sec")]
    pub short_green_sec: u32,
    /// Green duration when the peak queue exceeds threshold (s)
    #[serde(default = "default_long_green_sec")]
    pub long_green_sec: u32,
    /// Close the barrier when the train ETA is at or below this lead (ms)
    #[serde(default = "default_close_lead_ms")]
    pub close_lead_ms: f64,
}

fn default_queue_threshold() -> f64 {
    20.0
}

fn default_short_green_sec() -> u32 {
    15
}

fn default_long_green_sec() -> u32 {
    30
}

fn default_close_lead_ms() -> f64 {
    20_000.0
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            queue_threshold: default_queue_threshold(),
            short_green_sec: default_short_green_sec(),
            long_green_sec: default_long_green_sec(),
            close_lead_ms: default_close_lead_ms(),
        }
    }
}

impl FallbackConfig {
    /// Reject values the fallback rule cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        if self.short_green_sec == 0 {
            return Err("fallback.short_green_sec must be > 0".to_string());
        }
        if self.long_green_sec == 0 {
            return Err("fallback.long_green_sec must be > 0".to_string());
        }
        if !self.queue_threshold.is_finite() || self.queue_threshold < 0.0 {
            return Err(format!(
                "fallback.queue_threshold must be finite and >= 0, got {}",
                self.queue_threshold
            ));
        }
        if !self.close_lead_ms.is_finite() || self.close_lead_ms < 0.0 {
            return Err(format!(
                "fallback.close_lead_ms must be finite and >= 0, got {}",
                self.close_lead_ms
            ));
        }
        Ok(())
    }
}

/// Capacity bounds for the measurement store and decision log.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Recent-history ring size per kind
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Pending queue bound per kind (oldest dropped when full)
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    /// Decisions retained by the decision log
    #[serde(default = "default_decision_capacity")]
    pub decision_capacity: usize,
}

fn default_history_capacity() -> usize {
    200
}

fn default_pending_capacity() -> usize {
    1000
}

fn default_decision_capacity() -> usize {
    1000
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            pending_capacity: default_pending_capacity(),
            decision_capacity: default_decision_capacity(),
        }
    }
}
