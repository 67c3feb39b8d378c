//! tapewatch - Entry Point
//!
//! Follows one pair's trade tape: backlog plus live trades, short and long
//! window VWAP, and price alarms.

use anyhow::Result;
use clap::Parser;
use tape_analytics::Alarm;
use tape_bot::config::Overrides;
use tape_core::CurrencyPair;
use tape_history::HistoryWindow;
use tracing::info;

/// Live trade tape with VWAP and price alarms
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TAPEWATCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Currency pair, e.g. btcusd or eth/eur
    #[arg(short, long)]
    pair: Option<CurrencyPair>,

    /// Backlog to replay first: none, minute, hour or day
    #[arg(short, long)]
    window: Option<HistoryWindow>,

    /// Price alarm such as ">10000" or "<9500"; repeatable
    #[arg(short, long = "alarm")]
    alarms: Vec<Alarm>,

    /// Command run when an alarm triggers (%p = price, %a = alarm)
    #[arg(long)]
    alarm_command: Option<String>,

    /// Skip backlog trades older than this many seconds
    #[arg(long)]
    display_window_secs: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    tape_ws::init_crypto();

    let args = Args::parse();

    tape_telemetry::init_logging()?;

    info!("Starting tapewatch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = tape_bot::AppConfig::load(args.config.as_deref())?;
    config.apply(Overrides {
        pair: args.pair,
        history_window: args.window,
        alarms: args.alarms,
        alarm_command: args.alarm_command,
        display_window_secs: args.display_window_secs,
    });
    info!(
        pair = %config.pair,
        window = %config.history_window,
        alarms = config.alarm.alarms.len(),
        "Configuration loaded"
    );

    let app = tape_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
