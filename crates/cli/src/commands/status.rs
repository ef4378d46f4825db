//! `tabtally status`: show store statistics.

use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = tabtally_store::open_store(&config.store).await?;
    let stats = store.stats().await;
    store.close().await;
    let stats = stats?;

    println!("🦀 tabtally Status");
    println!("==================");
    println!("  Config:            {}", super::config_file(config_path).display());
    println!("  Store:             {}", config.store.backend);
    println!("  Interval:          {}s", config.interval_secs);
    println!("  Untagged rows:     {}", stats.untagged_rows);
    println!("  Untagged groups:   {}", stats.untagged_groups);
    println!("  Tagged rows:       {}", stats.tagged_rows);
    println!("  Duplicate groups:  {}", stats.duplicate_tagged_groups);
    println!("  Total time:        {}s", stats.total_duration);

    if stats.is_reconciled() {
        println!("\n  ✅ Fully reconciled");
    } else {
        println!("\n  ⏳ Work pending for the next cycle");
    }

    Ok(())
}
