//! Session reconciliation for tabtally.
//!
//! A cycle merges rows sharing `(Title, DateUsed)` into their minimum-Id
//! row, summing durations, and labels untagged rows through a
//! [`tabtally_core::Classifier`].

pub mod engine;
pub mod error;
pub mod report;

pub use engine::ReconcileEngine;
pub use error::ReconcileError;
pub use report::{CycleReport, GroupOutcome, GroupStatus, PhaseReport};
