//! `tabtally doctor`: diagnose config, store and classifier.

use std::path::Path;
use std::time::Duration;
use tabtally_core::Provider;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 tabtally Doctor: System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let path = super::config_file(config_path);
    if !path.exists() {
        println!("  ⚠️  No config file at {}, using defaults", path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    match tabtally_store::open_store(&config.store).await {
        Ok(store) => {
            match store.stats().await {
                Ok(stats) => println!(
                    "  ✅ Store reachable ({} rows)",
                    stats.untagged_rows + stats.tagged_rows
                ),
                Err(e) => {
                    println!("  ❌ Store query failed: {e}");
                    issues += 1;
                }
            }
            store.close().await;
        }
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    let classifier = &config.classifier;
    if !classifier.enabled {
        println!("  ⚠️  Classifier disabled, new sessions will be tagged Unknown");
    } else if classifier.provider != "ollama" && !classifier.has_api_key() {
        println!("  ⚠️  No API key configured, set classifier.api_key or TABTALLY_API_KEY");
        issues += 1;
    } else {
        match tabtally_providers::build_provider(classifier) {
            Ok(provider) => {
                let check = tokio::time::timeout(Duration::from_secs(10), provider.health_check());
                match check.await {
                    Ok(Ok(true)) => println!("  ✅ Provider {} reachable", provider.name()),
                    Ok(Ok(false)) => {
                        println!("  ⚠️  Provider {} rejected the health check", provider.name());
                        issues += 1;
                    }
                    Ok(Err(e)) => {
                        println!("  ❌ Provider {} unreachable: {e}", provider.name());
                        issues += 1;
                    }
                    Err(_) => {
                        println!("  ❌ Provider {} timed out", provider.name());
                        issues += 1;
                    }
                }
            }
            Err(e) => {
                println!("  ❌ Provider misconfigured: {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
