//! `tabtally run`: reconcile on a fixed interval until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabtally_reconcile::ReconcileEngine;
use tabtally_scheduler::{IntervalTicker, Scheduler};
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run(
    config_path: Option<&Path>,
    interval: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(secs) = interval {
        if secs == 0 {
            return Err("--interval must be greater than 0".into());
        }
        config.interval_secs = secs;
    }

    let store = tabtally_store::open_store(&config.store).await?;
    let classifier = tabtally_providers::build_classifier(&config.classifier)?;

    println!("🦀 tabtally: reconciling every {}s", config.interval_secs);
    println!("   Store:      {} ({})", store.name(), config.store.backend);
    println!("   Classifier: {}", classifier.name());
    println!("   Press Ctrl-C to stop.\n");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let engine = ReconcileEngine::new(Arc::clone(&store), classifier);
    let ticker = IntervalTicker::new(Duration::from_secs(config.interval_secs))
        .with_shutdown(shutdown_rx);
    let stats = Scheduler::new(engine).run(ticker).await;

    store.close().await;
    println!(
        "\n✅ Stopped after {} cycle(s): {} changed, {} failed",
        stats.cycles, stats.changed_cycles, stats.failed_cycles
    );
    Ok(())
}
