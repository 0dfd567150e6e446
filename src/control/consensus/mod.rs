//! Consensus anchoring.
//!
//! - `ledger`: the `ConsensusLedger` collaborator, its HTTP bridge and an
//!   in-process ledger
//! - `anchor`: topic resolution and the confirmation-vs-budget race

mod anchor;
mod ledger;

pub use anchor::*;
pub use ledger::*;
