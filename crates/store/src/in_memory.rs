//! In-memory session store, useful for testing and dry runs.
//!
//! Mirrors the SQLite backend's semantics exactly. A merge holds the write
//! lock for its whole duration, which gives it the same all-or-nothing
//! behaviour as a transaction.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tabtally_core::error::StoreError;
use tabtally_core::session::{
    GroupKey, GroupTotal, MergeOutcome, MergeRequest, NewSession, Phase, SessionRecord, StoreStats,
};
use tabtally_core::{SessionStore, Topic};
use tokio::sync::RwLock;

#[derive(Default)]
struct Table {
    rows: BTreeMap<i64, SessionRecord>,
    last_id: i64,
}

impl Table {
    fn group_rows<'a>(
        &'a self,
        key: &'a GroupKey,
        phase: Phase,
        upto: i64,
    ) -> impl Iterator<Item = &'a SessionRecord> + 'a {
        self.rows.range(..=upto).map(|(_, r)| r).filter(move |r| {
            r.title == key.title && r.date_used == key.date_used && phase.matches(r.topic)
        })
    }

    fn groups(&self, phase: Phase) -> Vec<GroupTotal> {
        // Insertion order of keys follows the first (minimum) Id of each group.
        let mut order: Vec<GroupKey> = Vec::new();
        let mut totals: BTreeMap<GroupKey, GroupTotal> = BTreeMap::new();

        for row in self.rows.values().filter(|r| phase.matches(r.topic)) {
            let key = row.key();
            let entry = totals.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                GroupTotal {
                    key,
                    count: 0,
                    total_duration: 0,
                    max_id: row.id,
                }
            });
            entry.count += 1;
            entry.total_duration += row.duration_sec;
            entry.max_id = entry.max_id.max(row.id);
        }

        order
            .into_iter()
            .filter_map(|key| totals.remove(&key))
            .filter(|g| phase == Phase::Untagged || g.count > 1)
            .collect()
    }
}

/// A session store held in a `BTreeMap` keyed by Id.
pub struct InMemorySessionStore {
    table: Arc<RwLock<Table>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::default())),
        }
    }

    /// Insert a row that already carries a topic, as a previous cycle would
    /// have left it.
    pub async fn insert_with_topic(&self, session: NewSession, topic: Option<Topic>) -> i64 {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let id = table.last_id;
        table.rows.insert(
            id,
            SessionRecord {
                id,
                title: session.title,
                date_used: session.date_used,
                duration_sec: session.duration_sec,
                topic,
            },
        );
        id
    }

    /// Remove a row directly, bypassing reconciliation.
    pub async fn remove(&self, id: i64) -> bool {
        self.table.write().await.rows.remove(&id).is_some()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn group_totals(&self, phase: Phase) -> Result<Vec<GroupTotal>, StoreError> {
        Ok(self.table.read().await.groups(phase))
    }

    async fn canonical_row(
        &self,
        key: &GroupKey,
        phase: Phase,
        upto: i64,
    ) -> Result<Option<i64>, StoreError> {
        let table = self.table.read().await;
        Ok(table.group_rows(key, phase, upto).next().map(|r| r.id))
    }

    async fn merge_group(&self, request: &MergeRequest) -> Result<Option<MergeOutcome>, StoreError> {
        let mut table = self.table.write().await;

        let ids: Vec<i64> = table
            .group_rows(&request.key, request.phase, request.upto)
            .map(|r| r.id)
            .collect();
        let Some((&canonical_id, others)) = ids.split_first() else {
            return Ok(None);
        };

        let total_duration: i64 = ids
            .iter()
            .filter_map(|id| table.rows.get(id))
            .map(|r| r.duration_sec)
            .sum();
        let rows = ids.len() as u64;

        let topic = match request.phase {
            Phase::Untagged => Some(request.topic.unwrap_or(Topic::Unknown)),
            Phase::Tagged => None,
        };

        let canonical = table.rows.get_mut(&canonical_id).ok_or_else(|| {
            StoreError::TransactionFailed(format!("canonical row Id={canonical_id} vanished during merge"))
        })?;
        if rows > 1 {
            canonical.duration_sec = total_duration;
        }
        if topic.is_some() {
            canonical.topic = topic;
        }

        for id in others {
            table.rows.remove(id);
        }

        Ok(Some(MergeOutcome {
            canonical_id,
            rows,
            total_duration,
            removed: others.len() as u64,
            topic,
        }))
    }

    async fn insert(&self, session: NewSession) -> Result<i64, StoreError> {
        Ok(self.insert_with_topic(session, None).await)
    }

    async fn get(&self, id: i64) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let table = self.table.read().await;
        let untagged_rows = table.rows.values().filter(|r| r.topic.is_none()).count() as u64;

        Ok(StoreStats {
            untagged_rows,
            tagged_rows: table.rows.len() as u64 - untagged_rows,
            untagged_groups: table.groups(Phase::Untagged).len() as u64,
            duplicate_tagged_groups: table.groups(Phase::Tagged).len() as u64,
            total_duration: table.rows.values().map(|r| r.duration_sec).sum(),
        })
    }
}
