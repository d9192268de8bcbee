//! Heatview CLI - Viewing telemetry toolkit
//!
//! Features:
//! - Heatmap range encoding
//! - Media metadata lookup
//! - Synthetic viewing sessions against the analytics endpoint

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Heatview CLI - Viewing telemetry toolkit
#[derive(Parser)]
#[command(name = "heatview")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Watch heatmap encoding and viewing telemetry toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Range-encode a heatmap given as a JSON object of second -> count
    Encode {
        /// Path to the JSON file, or '-' for stdin
        input: String,

        /// Known duration in seconds (0 = unknown)
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },

    /// Resolve metadata for a media id
    Metadata {
        /// Media id
        rid: String,
    },

    /// Replay a synthetic viewing session
    Simulate {
        /// Media id
        rid: String,

        /// Seconds of playback to simulate
        #[arg(short, long, default_value = "30")]
        seconds: u64,

        /// Rewatch this many seconds before ending (seek back)
        #[arg(long, default_value = "0")]
        rewatch: u64,

        /// Pace position updates in real time instead of a simulated clock
        #[arg(long)]
        realtime: bool,

        /// Print requests instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Milliseconds to wait for in-flight sends before exiting
        #[arg(long, default_value = "2000")]
        grace_ms: u64,

        /// Viewer id
        #[arg(long)]
        uid: Option<String>,

        /// Viewer name
        #[arg(long)]
        name: Option<String>,

        /// Viewer email
        #[arg(long)]
        email: Option<String>,

        /// Viewer account id
        #[arg(long)]
        account_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    heatview_core::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Encode { input, duration } => {
            commands::encode(&input, duration, &cli.format)?;
        }
        Commands::Metadata { rid } => {
            commands::metadata(&config, &rid, &cli.format).await?;
        }
        Commands::Simulate {
            rid,
            seconds,
            rewatch,
            realtime,
            dry_run,
            grace_ms,
            uid,
            name,
            email,
            account_id,
        } => {
            let viewer = heatview_core::ViewerIdentity {
                uid,
                name,
                email,
                account_id,
            };
            let options = commands::SimulateOptions {
                seconds,
                rewatch,
                realtime,
                dry_run,
                grace_ms,
            };
            commands::simulate(&config, &rid, viewer, options, &cli.format).await?;
        }
    }

    Ok(())
}
