//! Configuration types for the control node.
//!
//! This module is organized into focused submodules:
//!
//! - `core`: Pipeline cadence, batch limits, fallback tuning, retention bounds
//! - `collaborators`: Inference, consensus ledger and actuation endpoints
//! - `app`: Top-level TOML document and the supervisor / monitoring sections

mod app;
mod collaborators;
mod core;

pub use app::*;
pub use collaborators::*;
pub use core::*;
