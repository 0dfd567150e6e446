#![deny(unreachable_pub)]

// Core modules
mod errors;
mod prelude;
mod req;

// Shared domain types
pub mod types;

// Pipeline components
pub mod control;

// Re-exports
pub use errors::{ActuationError, Error, InferenceError, LedgerError, ObservationError, ValidationError};
pub use req::HttpClient;
pub use types::*;

pub use control::config::AppConfig;
pub use control::infra::{init_logging, LogConfig, LogFormat};
pub use control::{
    Actuator, AnchorOutcome, ConsensusAnchor, ConsensusLedger, ControlRuntime, DecisionLog,
    DecisionPipeline, FallbackPolicy, HttpActuator, HttpLedger, HttpOracle, InferenceGateway,
    InferenceOracle, MeasurementSnapshot, MeasurementStore, MemoryLedger, NoopActuator,
    PipelineMetrics, PolicyDecision, ReceiptSink, SupervisorCheck, SupervisorReport, TickReport,
};
