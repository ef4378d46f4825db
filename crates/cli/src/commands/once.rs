//! `tabtally once`: run a single cycle and print the report.

use std::path::Path;
use std::sync::Arc;
use tabtally_reconcile::{CycleReport, GroupStatus, PhaseReport, ReconcileEngine};

pub async fn run(config_path: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = tabtally_store::open_store(&config.store).await?;
    let classifier = tabtally_providers::build_classifier(&config.classifier)?;

    let engine = ReconcileEngine::new(Arc::clone(&store), classifier);
    let result = engine.run_cycle().await;
    store.close().await;
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn phase_line(label: &str, phase: &PhaseReport) -> String {
    format!(
        "  {label:<9} {} group(s), {} annotated, {} merged, {} row(s) removed, {} skipped, {} failed",
        phase.groups, phase.annotated, phase.merged, phase.rows_removed, phase.skipped, phase.failed
    )
}

fn print_report(report: &CycleReport) {
    println!("🦀 tabtally: cycle finished in {} ms", report.elapsed.as_millis());
    println!("{}", phase_line("Untagged:", &report.untagged));
    println!("{}", phase_line("Tagged:", &report.tagged));

    for group in &report.groups {
        match &group.status {
            GroupStatus::Merged { outcome } => {
                let topic = outcome
                    .topic
                    .map(|t| format!(", {t}"))
                    .unwrap_or_default();
                println!(
                    "  ✅ {} → Id {} ({} row(s), {}s{topic})",
                    group.key, outcome.canonical_id, outcome.rows, outcome.total_duration
                );
            }
            GroupStatus::Skipped => println!("  ⏭️  {} vanished, skipped", group.key),
            GroupStatus::Failed { error } => println!("  ❌ {}: {error}", group.key),
        }
    }

    if !report.changed() {
        println!("\n  No changes made in this cycle.");
    }
}
