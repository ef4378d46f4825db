//! Session records and the grouping vocabulary shared by stores and the engine.
//!
//! A session row is one observed usage interval for a titled page on a given
//! date. Rows sharing a [`GroupKey`] describe the same logical session and are
//! folded together by the reconciliation engine, separately for each
//! [`Phase`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::topic::Topic;

/// Maximum stored title length, in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Title stored when the writer supplied none.
pub const UNKNOWN_TITLE: &str = "[Unknown Title]";

/// A row of the `Sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Monotonically assigned; the minimum Id of a group is its canonical row.
    pub id: i64,
    pub title: String,
    pub date_used: NaiveDate,
    pub duration_sec: i64,
    /// `None` until the engine classifies the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

impl SessionRecord {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.title.clone(), self.date_used)
    }

    pub fn phase(&self) -> Phase {
        Phase::of(self.topic)
    }
}

/// A session about to be inserted. Topic always starts absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub title: String,
    pub date_used: NaiveDate,
    pub duration_sec: i64,
}

impl NewSession {
    pub fn new(title: impl Into<String>, date_used: NaiveDate, duration_sec: i64) -> Self {
        Self {
            title: title.into(),
            date_used,
            duration_sec,
        }
    }

    /// Apply the writer-side normalization rules: titles are capped at
    /// [`MAX_TITLE_CHARS`] and default to [`UNKNOWN_TITLE`], durations are
    /// clamped to be non-negative.
    pub fn normalized(title: Option<&str>, date_used: Option<NaiveDate>, duration_sec: i64) -> Self {
        let title = match title {
            Some(t) if !t.is_empty() => t.chars().take(MAX_TITLE_CHARS).collect(),
            _ => UNKNOWN_TITLE.to_string(),
        };
        Self {
            title,
            date_used: date_used.unwrap_or_default(),
            duration_sec: duration_sec.max(0),
        }
    }
}

/// A session as posted by the browser extension.
///
/// Every field is optional and loosely typed; [`NewSession::from`] applies
/// the fallbacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingSession {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date_used: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<serde_json::Value>,
}

/// The extension's upload payload: `{"sessions": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingBatch {
    pub sessions: Vec<IncomingSession>,
}

impl From<IncomingSession> for NewSession {
    fn from(incoming: IncomingSession) -> Self {
        let date = incoming.date_used.as_deref().and_then(parse_date);
        let duration = incoming
            .duration_sec
            .as_ref()
            .and_then(parse_duration)
            .unwrap_or(0);
        NewSession::normalized(incoming.title.as_deref(), date, duration)
    }
}

/// Accepts `YYYY-MM-DD` or any RFC 3339 timestamp (its date part is kept).
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.date_naive())
    })
}

fn parse_duration(value: &serde_json::Value) -> Option<i64> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if secs.is_finite() && secs >= 0.0 {
        Some(secs.trunc() as i64)
    } else {
        None
    }
}

/// The identity of a logical session: `(Title, DateUsed)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub title: String,
    pub date_used: NaiveDate,
}

impl GroupKey {
    pub fn new(title: impl Into<String>, date_used: NaiveDate) -> Self {
        Self {
            title: title.into(),
            date_used,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' @ {}", self.title, self.date_used)
    }
}

/// Which partition of the table a pass works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Topic IS NULL: rows waiting for classification.
    Untagged,
    /// Topic IS NOT NULL: already classified rows.
    Tagged,
}

impl Phase {
    pub fn of(topic: Option<Topic>) -> Phase {
        match topic {
            None => Phase::Untagged,
            Some(_) => Phase::Tagged,
        }
    }

    pub fn matches(&self, topic: Option<Topic>) -> bool {
        Phase::of(topic) == *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Untagged => "untagged",
            Phase::Tagged => "tagged",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the grouped scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTotal {
    pub key: GroupKey,
    pub count: u64,
    pub total_duration: i64,
    /// Highest Id seen for this group at scan time. Mutations of the group
    /// never touch rows above it.
    pub max_id: i64,
}

/// Instruction to fold one group into its canonical row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub key: GroupKey,
    pub phase: Phase,
    /// Snapshot bound, normally [`GroupTotal::max_id`].
    pub upto: i64,
    /// Topic to assign in [`Phase::Untagged`] ([`Topic::Unknown`] if absent). Ignored otherwise.
    pub topic: Option<Topic>,
}

impl MergeRequest {
    pub fn untagged(group: &GroupTotal, topic: Topic) -> Self {
        Self {
            key: group.key.clone(),
            phase: Phase::Untagged,
            upto: group.max_id,
            topic: Some(topic),
        }
    }

    pub fn tagged(group: &GroupTotal) -> Self {
        Self {
            key: group.key.clone(),
            phase: Phase::Tagged,
            upto: group.max_id,
            topic: None,
        }
    }
}

/// What a committed merge did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub canonical_id: i64,
    /// Rows of the group (canonical included) seen inside the transaction.
    pub rows: u64,
    /// Duration written to the canonical row.
    pub total_duration: i64,
    /// Rows deleted.
    pub removed: u64,
    /// Topic written, if the merge assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

/// Table-level counters, for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub untagged_rows: u64,
    pub tagged_rows: u64,
    pub untagged_groups: u64,
    pub duplicate_tagged_groups: u64,
    pub total_duration: i64,
}

impl StoreStats {
    /// True when a cycle would have nothing to do.
    pub fn is_reconciled(&self) -> bool {
        self.untagged_rows == 0 && self.duplicate_tagged_groups == 0
    }
}
