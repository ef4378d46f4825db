use tabtally_core::error::StoreError;
use tabtally_core::session::Phase;
use thiserror::Error;

/// Errors that abort a reconciliation cycle.
///
/// Failures confined to a single group never surface here; they are rolled
/// back, logged, and counted in the cycle report.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The grouped scan of a phase failed.
    #[error("{phase} scan failed: {source}")]
    Scan {
        phase: Phase,
        #[source]
        source: StoreError,
    },

    /// The store became unreachable part-way through a phase.
    #[error("store unreachable during {phase} phase: {source}")]
    Unavailable {
        phase: Phase,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn phase(&self) -> Phase {
        match self {
            ReconcileError::Scan { phase, .. } | ReconcileError::Unavailable { phase, .. } => *phase,
        }
    }
}
