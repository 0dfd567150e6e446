//! Crossing control pipeline.
//!
//! Data flows measurement → observation → inference (primary, secondary) or
//! fallback → actuation → consensus anchor → decision log. The supervisor
//! reads the log; the runtime drives everything on intervals.
//!
//! # Components
//!
//! - **measurement**: per-kind pending FIFO, history ring and latest-by-location
//! - **inference**: oracle collaborator, response validation, timeout-bounded gateway
//! - **fallback**: deterministic rule used when no inference route answers
//! - **pipeline**: the per-kind tick and per-measurement decision flow
//! - **actuation**: best-effort hand-off to the physical controllers
//! - **consensus**: ledger collaborator and the confirmation/budget race
//! - **decision_log**: bounded decision history with late receipt updates
//! - **supervisor**: cross-domain safety check
//! - **runtime**: interval loops and shutdown
//! - **config** / **infra**: TOML configuration, logging and metrics

pub mod actuation;
pub mod config;
pub mod consensus;
pub mod decision_log;
pub mod fallback;
pub mod inference;
pub mod infra;
pub mod measurement;
pub mod pipeline;
pub mod runtime;
pub mod supervisor;

#[cfg(test)]
mod tests;

pub use actuation::{Actuator, HttpActuator, NoopActuator};
pub use consensus::{AnchorOutcome, ConsensusAnchor, ConsensusLedger, HttpLedger, MemoryLedger, ReceiptSink};
pub use decision_log::DecisionLog;
pub use fallback::FallbackPolicy;
pub use inference::{HttpOracle, InferenceGateway, InferenceOracle, PolicyDecision};
pub use infra::PipelineMetrics;
pub use measurement::{MeasurementSnapshot, MeasurementStore};
pub use pipeline::{DecisionPipeline, TickReport};
pub use runtime::ControlRuntime;
pub use supervisor::{SupervisorCheck, SupervisorReport};
