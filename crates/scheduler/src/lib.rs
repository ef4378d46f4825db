//! Fixed-interval reconciliation loop.
//!
//! Runs one cycle per tick, strictly sequentially. A failed cycle is logged
//! and the loop carries on at the next tick with the same interval.

pub mod ticker;

pub use ticker::{FixedTicks, IntervalTicker, Ticker};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tabtally_reconcile::{CycleReport, ReconcileEngine, ReconcileError};
use tracing::{debug, error, info};

/// Anything that can run one reconciliation cycle.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport, ReconcileError>;
}

#[async_trait]
impl Reconciler for ReconcileEngine {
    async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        ReconcileEngine::run_cycle(self).await
    }
}

#[async_trait]
impl<R: Reconciler + ?Sized> Reconciler for Arc<R> {
    async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        (**self).run_cycle().await
    }
}

/// Totals over the lifetime of one [`Scheduler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub changed_cycles: u64,
    pub failed_cycles: u64,
}

pub struct Scheduler<R> {
    reconciler: R,
}

impl<R: Reconciler> Scheduler<R> {
    pub fn new(reconciler: R) -> Self {
        Self { reconciler }
    }

    /// Run a single cycle.
    pub async fn run_once(&self) -> Result<CycleReport, ReconcileError> {
        self.reconciler.run_cycle().await
    }

    /// Run cycles until the ticker says stop.
    pub async fn run<T: Ticker>(&self, mut ticker: T) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        info!("Scheduler started");

        while ticker.tick().await {
            stats.cycles += 1;
            debug!(cycle = stats.cycles, "Starting reconciliation cycle");

            match self.run_once().await {
                Ok(report) => {
                    if report.changed() {
                        stats.changed_cycles += 1;
                    }
                }
                Err(e) => {
                    stats.failed_cycles += 1;
                    error!(cycle = stats.cycles, phase = %e.phase(), error = %e, "Error in reconciliation cycle");
                }
            }
        }

        info!(
            cycles = stats.cycles,
            changed = stats.changed_cycles,
            failed = stats.failed_cycles,
            "Scheduler stopped"
        );
        stats
    }
}
