//! What a reconciliation cycle did.

use serde::Serialize;
use std::time::Duration;
use tabtally_core::session::{GroupKey, MergeOutcome, Phase};

/// Result of processing one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    /// The merge committed.
    Merged { outcome: MergeOutcome },
    /// The group vanished between scan and merge.
    Skipped,
    /// The group's transaction failed and was rolled back.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    pub phase: Phase,
    pub key: GroupKey,
    #[serde(flatten)]
    pub status: GroupStatus,
}

/// Counters for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    /// Groups returned by the scan.
    pub groups: u64,
    /// Groups that received a topic.
    pub annotated: u64,
    /// Groups of more than one row folded into their canonical row.
    pub merged: u64,
    pub rows_removed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl PhaseReport {
    fn record(&mut self, status: &GroupStatus) {
        match status {
            GroupStatus::Merged { outcome } => {
                if outcome.topic.is_some() {
                    self.annotated += 1;
                }
                if outcome.rows > 1 {
                    self.merged += 1;
                }
                self.rows_removed += outcome.removed;
            }
            GroupStatus::Skipped => self.skipped += 1,
            GroupStatus::Failed { .. } => self.failed += 1,
        }
    }

    /// Whether any group of this phase was committed.
    pub fn changed(&self) -> bool {
        self.annotated > 0 || self.merged > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub untagged: PhaseReport,
    pub tagged: PhaseReport,
    pub groups: Vec<GroupOutcome>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleReport {
    /// True if the cycle modified the table.
    pub fn changed(&self) -> bool {
        self.untagged.changed() || self.tagged.changed()
    }

    pub fn failed(&self) -> u64 {
        self.untagged.failed + self.tagged.failed
    }

    pub(crate) fn record(&mut self, phase: Phase, key: GroupKey, status: GroupStatus) {
        match phase {
            Phase::Untagged => self.untagged.record(&status),
            Phase::Tagged => self.tagged.record(&status),
        }
        self.groups.push(GroupOutcome { phase, key, status });
    }
}
