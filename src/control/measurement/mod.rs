//! Measurement buffering.
//!
//! - **MeasurementStore**: per-kind pending FIFO, history ring, latest-by-location
//! - **extract**: kind-specific scalar extraction from opaque sensor payloads

pub mod extract;
mod store;

pub use store::*;
