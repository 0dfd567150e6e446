//! Top-level configuration document (TOML).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    ActuationConfig, ConsensusConfig, FallbackConfig, InferenceConfig, PipelineConfig,
    RetentionConfig,
};
use crate::control::infra::LogConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub actuation: ActuationConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.fallback.validate()
    }
}

/// Cross-domain safety check cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Interval between supervisor checks (ms, 0 disables the loop)
    #[serde(default = "default_supervisor_interval_ms")]
    pub interval_ms: u64,
    /// Anchor each report under the `supervisor` topic
    #[serde(default)]
    pub anchor_reports: bool,
}

fn default_supervisor_interval_ms() -> u64 {
    5000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_supervisor_interval_ms(),
            anchor_reports: false,
        }
    }
}

impl SupervisorConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// HTTP port for the Prometheus metrics endpoint (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
        }
    }
}
