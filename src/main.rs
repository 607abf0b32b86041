use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beaconsync::demo::{self, DemoOptions};
use beaconsync::sync::codec;
use beaconsync::Config;

/// `beaconsync` - last-writer-wins icon/color sync over a broadcast medium.
#[derive(Parser, Debug)]
#[command(name = "beaconsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run several in-process peers on a loopback bus and check convergence
    Demo {
        /// Number of peers
        #[arg(long, default_value_t = 3)]
        peers: usize,

        /// Number of random local edits
        #[arg(long, default_value_t = 10)]
        edits: usize,

        /// Pause between edits in milliseconds
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,

        /// Time allowed for the last edit to propagate, in milliseconds
        #[arg(long, default_value_t = 200)]
        settle_ms: u64,
    },

    /// Decode a hex-encoded 16-byte state payload
    Inspect {
        /// Payload bytes as hex, e.g. 00000007000000000000018c...
        payload: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Demo {
            peers,
            edits,
            interval_ms,
            settle_ms,
        } => {
            let options = DemoOptions {
                peers,
                edits,
                edit_interval: Duration::from_millis(interval_ms),
                settle: Duration::from_millis(settle_ms),
            };
            let settings = config.engine_settings()?;
            let report = demo::run(&options, &settings).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.converged {
                anyhow::bail!("peers did not converge");
            }
        }
        Commands::Inspect { payload } => {
            let bytes = hex::decode(payload.trim()).context("Payload is not valid hex")?;
            let record = codec::decode(&bytes)?;
            let utc = chrono::DateTime::from_timestamp_millis(record.timestamp())
                .map(|dt| dt.to_rfc3339());
            let out = serde_json::json!({
                "icon_index": record.icon_index(),
                "color_index": record.color_index(),
                "timestamp": record.timestamp(),
                "timestamp_utc": utc,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
