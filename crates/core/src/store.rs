//! SessionStore trait: the session table as seen by the engine.
//!
//! The store offers exactly the operations reconciliation needs:
//! - a grouped scan per [`Phase`]
//! - a canonical-row lookup (minimum Id)
//! - an atomic fold of one group into its canonical row
//!
//! plus a few helpers for ingestion and status output. Every statement binds
//! Title/DateUsed/Id as parameters.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::{
    GroupKey, GroupTotal, MergeOutcome, MergeRequest, NewSession, Phase, SessionRecord, StoreStats,
};

/// The core SessionStore trait.
///
/// Implementations: SQLite, in-memory (for testing and dry runs).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Group the phase's rows by `(Title, DateUsed)`.
    ///
    /// [`Phase::Untagged`] returns every group; [`Phase::Tagged`] only groups
    /// with more than one row.
    async fn group_totals(&self, phase: Phase) -> Result<Vec<GroupTotal>, StoreError>;

    /// Id of the minimum-Id row matching `key` in `phase` with `Id <= upto`.
    async fn canonical_row(
        &self,
        key: &GroupKey,
        phase: Phase,
        upto: i64,
    ) -> Result<Option<i64>, StoreError>;

    /// Fold a group into its canonical row inside a single transaction.
    ///
    /// Re-selects the canonical row, recomputes the sum over rows with
    /// `Id <= request.upto`, updates the canonical row, deletes the others,
    /// and commits. Returns `Ok(None)` when no row of the group remains.
    /// On error the transaction is rolled back and nothing changes.
    async fn merge_group(&self, request: &MergeRequest) -> Result<Option<MergeOutcome>, StoreError>;

    /// Insert a new untagged session and return its Id.
    async fn insert(&self, session: NewSession) -> Result<i64, StoreError>;

    /// Fetch a row by Id.
    async fn get(&self, id: i64) -> Result<Option<SessionRecord>, StoreError>;

    /// All rows in Id order.
    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Table-level counters.
    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Release connections. The store must not be used afterwards.
    async fn close(&self) {}
}
