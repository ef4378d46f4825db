//! `tabtally init`: write the default configuration file.

use std::path::Path;
use tabtally_config::AppConfig;

pub async fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_file(config_path);

    if path.exists() && !force {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set classifier.api_key (or export TABTALLY_API_KEY)");
    println!("   2. Run `tabtally doctor` to check the setup");
    println!("   3. Run `tabtally run` to start reconciling");
    Ok(())
}
