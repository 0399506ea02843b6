//! Bybit scalper - main entry point
//!
//! Wires configuration, the exchange client and the strategy engine into a
//! periodic tick loop with graceful Ctrl-C shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bybit_scalper::{BybitClient, Config, Credentials, StrategyEngine};

#[derive(Parser, Debug)]
#[command(name = "bybit-scalper")]
#[command(about = "Maker-based scalping engine: passive BUY ladder with take-profit conversion", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the strategy configuration file
    #[arg(short, long, default_value = "configs/scalper.json")]
    config: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables before the config reads credentials
    dotenv::dotenv().ok();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;
    config
        .validate_for_trading()
        .context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let (api_key, api_secret) = config.credentials()?;
    let client = BybitClient::new(
        Credentials::new(api_key, api_secret),
        config.symbol.as_str(),
        config.category.as_str(),
    );

    info!(
        symbol = %config.symbol,
        category = %config.category,
        tick_size = %config.tick_size,
        qty = %config.order_qty,
        layers = config.max_buy_orders,
        tp_ticks = config.tp_ticks,
        "starting scalper"
    );

    // Startup probe; a failure here is informational only
    match client.wallet_balance().await {
        Ok(balance) => info!(%balance, "available wallet balance"),
        Err(e) => warn!(error = %e, "wallet balance probe failed"),
    }

    let loop_interval = config.loop_interval();
    let mut engine = StrategyEngine::new(config, client).context("Failed to create engine")?;
    engine.start()?;

    let mut tick_interval = interval(loop_interval);
    let mut tick_count: u64 = 0;

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                engine.tick().await;
                tick_count += 1;

                let snap = engine.snapshot();
                info!(
                    tick = tick_count,
                    state = snap.state,
                    open_buys = snap.open_buy_orders.len(),
                    open_tps = snap.open_tp_orders.len(),
                    realized = %snap.stats.realized_pnl,
                    estimated = %snap.estimated_profit,
                    avg_buy = %snap.average_buy_price,
                    "cycle complete"
                );
            }
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Ctrl-C received, shutting down"),
                    Err(e) => error!(error = %e, "signal handler failed, shutting down"),
                }
                break;
            }
        }
    }

    engine.stop().await?;

    // give the exchange a moment to acknowledge the final cancels
    tokio::time::sleep(Duration::from_millis(250)).await;

    let stats = engine.stats();
    info!(
        buys = stats.buy_filled,
        sells = stats.sell_filled,
        realized = %stats.realized_pnl,
        "session ended"
    );
    Ok(())
}
