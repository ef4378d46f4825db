//! `tabtally import`: insert sessions from an extension upload payload.

use std::path::Path;
use tabtally_core::session::{IncomingBatch, NewSession};
use tracing::debug;

pub async fn run(config_path: Option<&Path>, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let batch: IncomingBatch = serde_json::from_str(&text)
        .map_err(|e| format!("{} is not a sessions payload: {e}", file.display()))?;

    if batch.sessions.is_empty() {
        return Err("No sessions to import".into());
    }

    let config = super::load_config(config_path)?;
    let store = tabtally_store::open_store(&config.store).await?;

    let mut inserted = 0u64;
    let mut total_secs = 0i64;
    for incoming in batch.sessions {
        let session = NewSession::from(incoming);
        total_secs += session.duration_sec;
        let id = store.insert(session).await?;
        debug!(id, "Inserted session");
        inserted += 1;
    }
    store.close().await;

    println!(
        "✅ Imported {inserted} session(s) ({total_secs}s) from {}",
        file.display()
    );
    Ok(())
}
