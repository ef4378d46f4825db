//! SQLite session store.
//!
//! One table, `Sessions(Id, Title, Topic, DateUsed, DurationSec)`, with an
//! index on `(Title, DateUsed)` for the grouped scans. `DateUsed` is stored
//! as `YYYY-MM-DD` text and `Topic` as the label text (NULL when untagged).
//!
//! Each merge runs in its own transaction. Every statement inside it is
//! bounded by the scan's max Id, so rows a writer appends mid-cycle are
//! left for the next cycle.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tabtally_core::error::StoreError;
use tabtally_core::session::{
    GroupKey, GroupTotal, MergeOutcome, MergeRequest, NewSession, Phase, SessionRecord, StoreStats,
};
use tabtally_core::{SessionStore, Topic};
use tracing::{debug, info, warn};

/// A SQLite-backed session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// `sqlite::memory:` is supported; it is pinned to a single connection
    /// so every query sees the same database.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Connection(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        if !in_memory {
            Self::ensure_parent_dir(options.get_filename()).await?;
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {url}");
        Ok(store)
    }

    async fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::Connection(format!("Cannot create {}: {e}", dir.display()))),
            _ => Ok(()),
        }
    }

    /// The underlying pool, for callers that need raw access (fixtures, tooling).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Sessions (
                Id          INTEGER PRIMARY KEY AUTOINCREMENT,
                Title       TEXT NOT NULL,
                Topic       TEXT,
                DateUsed    TEXT NOT NULL,
                DurationSec INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("Sessions table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_title_date ON Sessions(Title, DateUsed)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("title/date index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// SQL predicate selecting a phase's rows.
    fn topic_predicate(phase: Phase) -> &'static str {
        match phase {
            Phase::Untagged => "Topic IS NULL",
            Phase::Tagged => "Topic IS NOT NULL",
        }
    }

    fn row_to_record(row: &SqliteRow) -> Result<SessionRecord, StoreError> {
        let id: i64 = row
            .try_get("Id")
            .map_err(|e| StoreError::InvalidRow(format!("Id column: {e}")))?;
        let title: String = row
            .try_get("Title")
            .map_err(|e| StoreError::InvalidRow(format!("Title column: {e}")))?;
        let topic: Option<String> = row
            .try_get("Topic")
            .map_err(|e| StoreError::InvalidRow(format!("Topic column: {e}")))?;
        let date_used: NaiveDate = row
            .try_get("DateUsed")
            .map_err(|e| StoreError::InvalidRow(format!("DateUsed column: {e}")))?;
        let duration_sec: i64 = row
            .try_get("DurationSec")
            .map_err(|e| StoreError::InvalidRow(format!("DurationSec column: {e}")))?;

        let topic = topic.map(|label| {
            Topic::from_label(&label).unwrap_or_else(|| {
                warn!(id, label = %label, "Row carries a label outside the vocabulary");
                Topic::Unknown
            })
        });

        Ok(SessionRecord {
            id,
            title,
            date_used,
            duration_sec,
            topic,
        })
    }

    fn row_to_group(row: &SqliteRow) -> Result<GroupTotal, StoreError> {
        let title: String = row
            .try_get("Title")
            .map_err(|e| StoreError::InvalidRow(format!("Title column: {e}")))?;
        let date_used: NaiveDate = row
            .try_get("DateUsed")
            .map_err(|e| StoreError::InvalidRow(format!("DateUsed column: {e}")))?;
        let count: i64 = row
            .try_get("NumRows")
            .map_err(|e| StoreError::InvalidRow(format!("NumRows column: {e}")))?;
        let total_duration: i64 = row
            .try_get("TotalSec")
            .map_err(|e| StoreError::InvalidRow(format!("TotalSec column: {e}")))?;
        let max_id: i64 = row
            .try_get("MaxId")
            .map_err(|e| StoreError::InvalidRow(format!("MaxId column: {e}")))?;

        Ok(GroupTotal {
            key: GroupKey::new(title, date_used),
            count: count.max(0) as u64,
            total_duration,
            max_id,
        })
    }

    async fn select_canonical(
        conn: &mut SqliteConnection,
        key: &GroupKey,
        phase: Phase,
        upto: i64,
    ) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT Id FROM Sessions \
             WHERE Title = ?1 AND DateUsed = ?2 AND {} AND Id <= ?3 \
             ORDER BY Id ASC LIMIT 1",
            Self::topic_predicate(phase)
        );

        let row = sqlx::query(&sql)
            .bind(&key.title)
            .bind(key.date_used)
            .bind(upto)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("canonical row for {key}: {e}")))?;

        row.map(|r| {
            r.try_get::<i64, _>("Id")
                .map_err(|e| StoreError::InvalidRow(format!("Id column: {e}")))
        })
        .transpose()
    }

    /// The body of [`SessionStore::merge_group`], run against an open transaction.
    async fn merge_in(
        conn: &mut SqliteConnection,
        request: &MergeRequest,
    ) -> Result<Option<MergeOutcome>, StoreError> {
        let key = &request.key;
        let predicate = Self::topic_predicate(request.phase);

        let Some(canonical_id) =
            Self::select_canonical(&mut *conn, key, request.phase, request.upto).await?
        else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT COUNT(*) AS NumRows, COALESCE(SUM(DurationSec), 0) AS TotalSec FROM Sessions \
             WHERE Title = ?1 AND DateUsed = ?2 AND {predicate} AND Id <= ?3"
        );
        let totals = sqlx::query(&sql)
            .bind(&key.title)
            .bind(key.date_used)
            .bind(request.upto)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| StoreError::TransactionFailed(format!("sum for {key}: {e}")))?;
        let rows: i64 = totals
            .try_get("NumRows")
            .map_err(|e| StoreError::InvalidRow(format!("NumRows column: {e}")))?;
        let total_duration: i64 = totals
            .try_get("TotalSec")
            .map_err(|e| StoreError::InvalidRow(format!("TotalSec column: {e}")))?;
        let rows = rows.max(0) as u64;

        let topic = match request.phase {
            Phase::Untagged => Some(request.topic.unwrap_or(Topic::Unknown)),
            Phase::Tagged => None,
        };

        let updated = match (topic, rows > 1) {
            (Some(topic), true) => {
                sqlx::query("UPDATE Sessions SET DurationSec = ?1, Topic = ?2 WHERE Id = ?3")
                    .bind(total_duration)
                    .bind(topic.as_str())
                    .bind(canonical_id)
                    .execute(&mut *conn)
                    .await
            }
            (Some(topic), false) => {
                sqlx::query("UPDATE Sessions SET Topic = ?1 WHERE Id = ?2")
                    .bind(topic.as_str())
                    .bind(canonical_id)
                    .execute(&mut *conn)
                    .await
            }
            (None, _) => {
                sqlx::query("UPDATE Sessions SET DurationSec = ?1 WHERE Id = ?2")
                    .bind(total_duration)
                    .bind(canonical_id)
                    .execute(&mut *conn)
                    .await
            }
        }
        .map_err(|e| StoreError::TransactionFailed(format!("update Id={canonical_id}: {e}")))?;

        if updated.rows_affected() != 1 {
            return Err(StoreError::TransactionFailed(format!(
                "canonical row Id={canonical_id} vanished during merge"
            )));
        }

        let removed = if rows > 1 {
            let sql = format!(
                "DELETE FROM Sessions \
                 WHERE Title = ?1 AND DateUsed = ?2 AND {predicate} AND Id <> ?3 AND Id <= ?4"
            );
            sqlx::query(&sql)
                .bind(&key.title)
                .bind(key.date_used)
                .bind(canonical_id)
                .bind(request.upto)
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::TransactionFailed(format!("delete for {key}: {e}")))?
                .rows_affected()
        } else {
            0
        };

        Ok(Some(MergeOutcome {
            canonical_id,
            rows,
            total_duration,
            removed,
            topic,
        }))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn group_totals(&self, phase: Phase) -> Result<Vec<GroupTotal>, StoreError> {
        let having = match phase {
            Phase::Untagged => "",
            Phase::Tagged => "HAVING COUNT(*) > 1",
        };
        let sql = format!(
            "SELECT Title, DateUsed, COUNT(*) AS NumRows, \
                    COALESCE(SUM(DurationSec), 0) AS TotalSec, MAX(Id) AS MaxId \
             FROM Sessions WHERE {} \
             GROUP BY Title, DateUsed {having} \
             ORDER BY MIN(Id)",
            Self::topic_predicate(phase)
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("{phase} scan: {e}")))?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn canonical_row(
        &self,
        key: &GroupKey,
        phase: Phase,
        upto: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Self::select_canonical(&mut *conn, key, phase, upto).await
    }

    async fn merge_group(&self, request: &MergeRequest) -> Result<Option<MergeOutcome>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(format!("begin transaction: {e}")))?;

        match Self::merge_in(&mut *tx, request).await {
            Ok(outcome) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::TransactionFailed(format!("commit: {e}")))?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(key = %request.key, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert(&self, session: NewSession) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO Sessions (Title, Topic, DateUsed, DurationSec) VALUES (?1, NULL, ?2, ?3)",
        )
        .bind(&session.title)
        .bind(session.date_used)
        .bind(session.duration_sec)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT Id, Title, Topic, DateUsed, DurationSec FROM Sessions WHERE Id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get Id={id}: {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT Id, Title, Topic, DateUsed, DurationSec FROM Sessions ORDER BY Id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN Topic IS NULL THEN 1 ELSE 0 END), 0) AS UntaggedRows,
                COALESCE(SUM(CASE WHEN Topic IS NOT NULL THEN 1 ELSE 0 END), 0) AS TaggedRows,
                COALESCE(SUM(DurationSec), 0) AS TotalSec,
                (SELECT COUNT(*) FROM
                    (SELECT 1 FROM Sessions WHERE Topic IS NULL GROUP BY Title, DateUsed))
                    AS UntaggedGroups,
                (SELECT COUNT(*) FROM
                    (SELECT 1 FROM Sessions WHERE Topic IS NOT NULL
                     GROUP BY Title, DateUsed HAVING COUNT(*) > 1))
                    AS DuplicateTaggedGroups
            FROM Sessions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("stats: {e}")))?;

        let count = |column: &str| -> Result<u64, StoreError> {
            row.try_get::<i64, _>(column)
                .map(|v| v.max(0) as u64)
                .map_err(|e| StoreError::InvalidRow(format!("{column} column: {e}")))
        };

        Ok(StoreStats {
            untagged_rows: count("UntaggedRows")?,
            tagged_rows: count("TaggedRows")?,
            untagged_groups: count("UntaggedGroups")?,
            duplicate_tagged_groups: count("DuplicateTaggedGroups")?,
            total_duration: row
                .try_get("TotalSec")
                .map_err(|e| StoreError::InvalidRow(format!("TotalSec column: {e}")))?,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("SQLite session store closed");
    }
}
