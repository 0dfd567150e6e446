//! Shared domain types for the control pipeline.
//!
//! These types cross every component boundary: measurements flow in from
//! ingestion, outcomes flow out to actuation, and decisions are what the
//! decision log and consensus anchor hold.

mod agent;
mod decision;
mod measurement;
mod observation;
mod outcome;

pub use agent::*;
pub use decision::*;
pub use measurement::*;
pub use observation::*;
pub use outcome::*;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}
