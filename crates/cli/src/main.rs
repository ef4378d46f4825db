//! tabtally CLI, the main entry point.
//!
//! Commands:
//! - `run`:    Reconcile on a fixed interval until Ctrl-C
//! - `once`:   Run a single reconciliation cycle
//! - `import`: Load an extension upload payload into the store
//! - `status`: Show row and duplicate counts
//! - `init`:   Write the default config file
//! - `doctor`: Diagnose config, store and classifier

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "tabtally",
    about = "Merge duplicate browsing-session rows and tag them by topic",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file to use instead of ~/.tabtally/config.toml
    #[arg(short, long, global = true, env = "TABTALLY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile continuously, once per interval
    Run {
        /// Override the interval between cycles, in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run a single reconciliation cycle and print what it did
    Once {
        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Insert sessions from a `{"sessions": [...]}` JSON file
    Import {
        /// Path to the payload file
        file: PathBuf,
    },

    /// Show store statistics
    Status,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run { interval } => commands::run::run(config, interval).await?,
        Commands::Once { json } => commands::once::run(config, json).await?,
        Commands::Import { file } => commands::import::run(config, &file).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Init { force } => commands::init::run(config, force).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
    }

    Ok(())
}
