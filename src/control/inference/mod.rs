//! Inference oracle access.
//!
//! - `oracle`: the `InferenceOracle` collaborator trait and its HTTP client
//! - `schema`: per-kind validation of oracle responses
//! - `gateway`: timeout-bounded, validated request path used by the pipeline

mod gateway;
mod oracle;
mod schema;

pub use gateway::*;
pub use oracle::*;
pub use schema::*;
