//! End-to-end integration tests for tabtally.
//!
//! These tests drive the whole pipeline: extension payload ingestion, the
//! LLM topic classifier over a scripted provider, the SQLite store, the
//! reconciliation engine and the scheduler loop.

use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tabtally_core::error::ProviderError;
use tabtally_core::message::Message;
use tabtally_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use tabtally_core::session::{IncomingBatch, NewSession};
use tabtally_core::{SessionStore, Topic};
use tabtally_providers::{ClassifierOptions, TopicClassifier};
use tabtally_reconcile::ReconcileEngine;
use tabtally_scheduler::{FixedTicks, Scheduler};
use tabtally_store::SqliteSessionStore;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Answers by title; titles without a script fail like an unreachable API.
struct ScriptedProvider {
    replies: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .iter()
                .map(|(title, reply)| (title.to_string(), reply.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn title_of(request: &ProviderRequest) -> String {
    request
        .messages
        .last()
        .and_then(|m| m.content.lines().rev().find_map(|l| l.strip_prefix("Title: ")))
        .unwrap_or_default()
        .to_string()
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let title = title_of(&request);
        self.calls.lock().unwrap().push(title.clone());

        match self.replies.get(&title) {
            Some(reply) => Ok(ProviderResponse {
                message: Message::assistant(reply.clone()),
                usage: Some(Usage {
                    prompt_tokens: 120,
                    completion_tokens: 1,
                    total_tokens: 121,
                }),
                model: "mock".into(),
            }),
            None => Err(ProviderError::Network("connection refused".into())),
        }
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn sqlite_store(dir: &tempfile::TempDir) -> Arc<SqliteSessionStore> {
    let url = format!("sqlite://{}", dir.path().join("sessions.db").display());
    Arc::new(SqliteSessionStore::new(&url, 2).await.unwrap())
}

fn engine(store: Arc<SqliteSessionStore>, provider: Arc<ScriptedProvider>) -> ReconcileEngine {
    let classifier = TopicClassifier::new(provider, ClassifierOptions::default());
    ReconcileEngine::new(store, Arc::new(classifier))
}

// ── Pipeline ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn extension_payload_is_reconciled_and_tagged() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    let payload = r#"{"sessions":[
        {"title":"Example Site","dateUsed":"2024-01-01","durationSec":10},
        {"title":"Example Site","dateUsed":"2024-01-01","durationSec":20},
        {"title":"Example Site","dateUsed":"2024-01-01T18:30:00Z","durationSec":"5"},
        {"title":"The Rust Programming Language","dateUsed":"2024-01-01","durationSec":7},
        {"title":"Example Site","dateUsed":"2024-01-02","durationSec":3}
    ]}"#;
    let batch: IncomingBatch = serde_json::from_str(payload).unwrap();
    for incoming in batch.sessions {
        store.insert(NewSession::from(incoming)).await.unwrap();
    }

    let provider = ScriptedProvider::new(&[
        ("Example Site", "Browsing"),
        ("The Rust Programming Language", " Programming \n"),
    ]);
    let engine = engine(store.clone(), provider.clone());

    let report = engine.run_cycle().await.unwrap();
    assert!(report.changed());
    assert_eq!(report.untagged.groups, 3);
    assert_eq!(report.untagged.merged, 1);
    assert_eq!(report.untagged.rows_removed, 2);

    let rows = store.list().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].duration_sec, 35);
    assert_eq!(rows[0].topic, Some(Topic::Browsing));
    assert_eq!(rows[1].topic, Some(Topic::Programming));
    assert_eq!(rows[2].date_used, day(2024, 1, 2));
    assert_eq!(rows[2].topic, Some(Topic::Browsing));

    // One classifier call per group, not per row.
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn provider_failure_tags_unknown_and_others_unaffected() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    store.insert(NewSession::new("Offline Page", day(2024, 3, 1), 4)).await.unwrap();
    store.insert(NewSession::new("Offline Page", day(2024, 3, 1), 6)).await.unwrap();
    store.insert(NewSession::new("Chess.com", day(2024, 3, 1), 60)).await.unwrap();

    let provider = ScriptedProvider::new(&[("Chess.com", "Gaming")]);
    engine(store.clone(), provider).run_cycle().await.unwrap();

    let rows = store.list().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title, "Offline Page");
    assert_eq!(rows[0].duration_sec, 10);
    assert_eq!(rows[0].topic, Some(Topic::Unknown));
    assert_eq!(rows[1].topic, Some(Topic::Gaming));

    let stored: String = sqlx::query_scalar("SELECT Topic FROM Sessions WHERE Id = 1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(stored, "[Unknown Topic]");
}

#[tokio::test]
async fn off_vocabulary_reply_is_never_stored_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    store.insert(NewSession::new("Weather Today", day(2024, 3, 1), 4)).await.unwrap();

    let provider = ScriptedProvider::new(&[("Weather Today", "Weather")]);
    engine(store.clone(), provider).run_cycle().await.unwrap();

    let labels: Vec<String> = sqlx::query_scalar("SELECT Topic FROM Sessions")
        .fetch_all(store.pool())
        .await
        .unwrap();
    assert_eq!(labels, vec!["[Unknown Topic]".to_string()]);
}

#[tokio::test]
async fn tagged_duplicates_from_later_uploads_are_folded() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    store.insert(NewSession::new("Hacker News", day(2024, 2, 1), 100)).await.unwrap();

    let provider = ScriptedProvider::new(&[("Hacker News", "Tech")]);
    let engine = engine(store.clone(), provider.clone());
    engine.run_cycle().await.unwrap();

    // A later upload adds another interval for the same page and day.
    store.insert(NewSession::new("Hacker News", day(2024, 2, 1), 50)).await.unwrap();
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.untagged.annotated, 1);
    assert_eq!(report.tagged.merged, 1);

    let rows = store.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].duration_sec, 150);
    assert_eq!(rows[0].topic, Some(Topic::Tech));
    assert!(store.stats().await.unwrap().is_reconciled());
}

#[tokio::test]
async fn scheduler_converges_and_then_idles() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;
    for (title, secs) in [("Inbox", 1), ("Inbox", 2), ("Docs", 3), ("Inbox", 4)] {
        store.insert(NewSession::new(title, day(2024, 4, 1), secs)).await.unwrap();
    }

    let provider = ScriptedProvider::new(&[("Inbox", "Job"), ("Docs", "Education")]);
    let scheduler = Scheduler::new(engine(store.clone(), provider.clone()));

    let stats = scheduler.run(FixedTicks::new(3)).await;
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.changed_cycles, 1);
    assert_eq!(stats.failed_cycles, 0);
    assert_eq!(provider.calls().len(), 2);

    let rows = store.list().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].duration_sec, 7);
    assert_eq!(rows[0].topic, Some(Topic::Job));

    store.close().await;
}

// ── Binary ───────────────────────────────────────────────────────────────

fn tabtally(config: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tabtally"));
    cmd.arg("--config").arg(config);
    for var in [
        "TABTALLY_DATABASE_URL",
        "TABTALLY_INTERVAL_SECS",
        "TABTALLY_API_URL",
        "TABTALLY_MODEL",
        "TABTALLY_API_KEY",
        "OPENAI_API_KEY",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let db = dir.path().join("sessions.db");
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "interval_secs = 60\n\n[store]\nbackend = \"sqlite\"\nurl = \"sqlite://{}\"\n\n[classifier]\nenabled = false\n",
            db.display()
        ),
    )
    .unwrap();
    config
}

#[test]
fn init_writes_a_loadable_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("nested").join("config.toml");

    let out = tabtally(&config).arg("init").output().unwrap();
    assert!(out.status.success());
    let text = std::fs::read_to_string(&config).unwrap();
    assert!(text.contains("interval_secs"));

    let again = tabtally(&config).arg("init").output().unwrap();
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("already exists"));
}

#[test]
fn import_then_once_reconciles_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let payload = dir.path().join("upload.json");
    std::fs::write(
        &payload,
        r#"{"sessions":[
            {"title":"GitHub","dateUsed":"2024-05-01","durationSec":30},
            {"title":"GitHub","dateUsed":"2024-05-01","durationSec":12}
        ]}"#,
    )
    .unwrap();

    let import = tabtally(&config).arg("import").arg(&payload).output().unwrap();
    assert!(import.status.success(), "{}", String::from_utf8_lossy(&import.stderr));
    assert!(String::from_utf8_lossy(&import.stdout).contains("Imported 2 session(s)"));

    let once = tabtally(&config).args(["once", "--json"]).output().unwrap();
    assert!(once.status.success(), "{}", String::from_utf8_lossy(&once.stderr));
    let report: serde_json::Value = serde_json::from_slice(&once.stdout).unwrap();
    assert_eq!(report["untagged"]["merged"], 1);
    assert_eq!(report["groups"][0]["status"], "merged");
    assert_eq!(report["groups"][0]["outcome"]["total_duration"], 42);
    assert_eq!(report["groups"][0]["outcome"]["topic"], "[Unknown Topic]");

    let again = tabtally(&config).arg("once").output().unwrap();
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("No changes made in this cycle."));

    let status = tabtally(&config).arg("status").output().unwrap();
    assert!(status.status.success());
    assert!(String::from_utf8_lossy(&status.stdout).contains("Fully reconciled"));
}

#[test]
fn import_rejects_malformed_payload() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let payload = dir.path().join("bad.json");
    std::fs::write(&payload, "[1, 2, 3]").unwrap();

    let out = tabtally(&config).arg("import").arg(&payload).output().unwrap();
    assert!(!out.status.success());
}
