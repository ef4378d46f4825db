//! The reconciliation cycle.
//!
//! Phase A folds every untagged group into its minimum-Id row and labels it
//! with one classifier call per group. Phase B folds duplicate groups among
//! already-tagged rows without touching their topic. Each group is its own
//! transaction, so a cycle interrupted part-way leaves every committed group
//! durable and the rest for the next cycle.

use std::sync::Arc;
use std::time::Instant;
use tabtally_core::error::StoreError;
use tabtally_core::session::{GroupKey, GroupTotal, MergeOutcome, MergeRequest, Phase};
use tabtally_core::{Classifier, SessionStore};
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::report::{CycleReport, GroupStatus};

pub struct ReconcileEngine {
    store: Arc<dyn SessionStore>,
    classifier: Arc<dyn Classifier>,
}

impl ReconcileEngine {
    pub fn new(store: Arc<dyn SessionStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Run both phases once.
    ///
    /// Fails only when a phase scan fails or the store becomes unreachable;
    /// everything else is recorded in the returned report.
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        self.untagged_phase(&mut report).await?;
        self.tagged_phase(&mut report).await?;

        report.elapsed = started.elapsed();
        if report.changed() {
            info!(
                annotated = report.untagged.annotated,
                merged = report.untagged.merged + report.tagged.merged,
                removed = report.untagged.rows_removed + report.tagged.rows_removed,
                failed = report.failed(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Reconciliation cycle complete"
            );
        } else {
            info!(failed = report.failed(), "No changes made in this cycle.");
        }
        Ok(report)
    }

    async fn untagged_phase(&self, report: &mut CycleReport) -> Result<(), ReconcileError> {
        let phase = Phase::Untagged;
        let groups = self.scan(phase).await?;
        report.untagged.groups = groups.len() as u64;

        for group in &groups {
            let status = self.reconcile_untagged(group).await?;
            report.record(phase, group.key.clone(), status);
        }
        Ok(())
    }

    async fn tagged_phase(&self, report: &mut CycleReport) -> Result<(), ReconcileError> {
        let phase = Phase::Tagged;
        let groups = self.scan(phase).await?;
        report.tagged.groups = groups.len() as u64;

        for group in &groups {
            let result = self.store.merge_group(&MergeRequest::tagged(group)).await;
            let status = Self::settle(phase, &group.key, result)?;
            report.record(phase, group.key.clone(), status);
        }
        Ok(())
    }

    async fn scan(&self, phase: Phase) -> Result<Vec<GroupTotal>, ReconcileError> {
        let groups = self
            .store
            .group_totals(phase)
            .await
            .map_err(|source| ReconcileError::Scan { phase, source })?;
        debug!(phase = %phase, groups = groups.len(), "Scanned groups");
        Ok(groups)
    }

    async fn reconcile_untagged(&self, group: &GroupTotal) -> Result<GroupStatus, ReconcileError> {
        let phase = Phase::Untagged;
        let key = &group.key;

        // A group that raced away costs no classifier call.
        match self.store.canonical_row(key, phase, group.max_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return Self::settle(phase, key, Ok(None)),
            Err(e) => return Self::settle(phase, key, Err(e)),
        }

        let topic = self.classifier.classify(&key.title).await;
        let result = self
            .store
            .merge_group(&MergeRequest::untagged(group, topic))
            .await;
        Self::settle(phase, key, result)
    }

    /// Turn one group's store result into a report entry, logging it.
    fn settle(
        phase: Phase,
        key: &GroupKey,
        result: Result<Option<MergeOutcome>, StoreError>,
    ) -> Result<GroupStatus, ReconcileError> {
        match result {
            Ok(Some(outcome)) => {
                Self::log_merge(phase, key, &outcome);
                Ok(GroupStatus::Merged { outcome })
            }
            Ok(None) => {
                debug!(phase = %phase, title = %key.title, date = %key.date_used, "Group vanished, skipping");
                Ok(GroupStatus::Skipped)
            }
            Err(source) if source.is_connection() => Err(ReconcileError::Unavailable { phase, source }),
            Err(e) => {
                warn!(
                    phase = %phase,
                    title = %key.title,
                    date = %key.date_used,
                    error = %e,
                    "Group merge rolled back"
                );
                Ok(GroupStatus::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    fn log_merge(phase: Phase, key: &GroupKey, outcome: &MergeOutcome) {
        match (phase, outcome.topic) {
            (Phase::Untagged, Some(topic)) if outcome.rows > 1 => info!(
                title = %key.title,
                date = %key.date_used,
                id = outcome.canonical_id,
                rows = outcome.rows,
                total = outcome.total_duration,
                topic = %topic,
                "Merged untagged rows"
            ),
            (_, Some(topic)) => info!(
                title = %key.title,
                date = %key.date_used,
                id = outcome.canonical_id,
                topic = %topic,
                "Classified session"
            ),
            (_, None) => info!(
                title = %key.title,
                date = %key.date_used,
                id = outcome.canonical_id,
                rows = outcome.rows,
                total = outcome.total_duration,
                "Merged tagged duplicates"
            ),
        }
    }
}
