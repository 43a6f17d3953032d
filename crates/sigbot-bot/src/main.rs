//! sigbot - webhook-driven signal trader.

use anyhow::Result;
use clap::{Parser, Subcommand};
use sigbot_persistence::TradeLog;
use tracing::info;

/// Webhook-driven single-position signal trader
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGBOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server and orchestrator (default)
    Run,
    /// Print the newest completed trades
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any connection
    sigbot_venue::init_crypto();

    let args = Args::parse();

    sigbot_telemetry::init_logging()?;

    // CLI arg > SIGBOT_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGBOT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = sigbot_bot::AppConfig::from_file(&config_path)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("Starting sigbot v{}", env!("CARGO_PKG_VERSION"));
            sigbot_bot::Application::new(config)?.run().await?;
        }
        Command::History { limit } => {
            let log = TradeLog::open(&config.history.dir)?;
            for record in log.recent(limit)? {
                println!(
                    "{}  {:<10} {:<5} {:<10} entry={} exit={} balance={}",
                    record.closed_at.format("%Y-%m-%d %H:%M:%S"),
                    record.symbol.to_string(),
                    record.side.to_string(),
                    record.reason.to_string(),
                    record.entry_price,
                    record.exit_price,
                    record.balance,
                );
            }
        }
    }

    Ok(())
}
