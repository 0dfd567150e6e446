//! Infrastructure modules.
//!
//! - **Logging**: `tracing` subscriber setup and component log targets
//! - **Metrics**: Atomic pipeline counters with Prometheus text output

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
