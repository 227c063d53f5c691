//! papertrader binary
//!
//! Three modes:
//! - `fetch`    download the historical bar series and write the CSV artifact
//! - `backtest` replay the baseline policies through the simulation environment
//! - `live`     run the live paper-trading loop until ctrl-c

use anyhow::{bail, Context, Result};
use std::io::Write;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use papertrader::config::AppConfig;
use papertrader::data::BinanceDataClient;
use papertrader::env::TradingEnv;
use papertrader::live::LiveTrader;
use papertrader::persistence::BarStore;
use papertrader::policy::{evaluate_policy, Policy, RandomPolicy, VwapMomentumPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(config = %config.digest(), "papertrader starting");

    let mode = std::env::args().nth(1).unwrap_or_default();
    match mode.as_str() {
        "fetch" => fetch(&config).await,
        "backtest" => backtest(&config),
        "live" => live(&config).await,
        other => {
            bail!("unknown mode {other:?}; expected fetch | backtest | live");
        }
    }
}

/// Download the configured date range and persist the bar artifact.
async fn fetch(config: &AppConfig) -> Result<()> {
    let client = BinanceDataClient::from_config(&config.fetch)?;
    let (start_ms, end_ms) = config.fetch_range()?;

    let bars = client
        .backfill(
            &config.market.symbol,
            &config.market.interval,
            start_ms,
            end_ms,
        )
        .await
        .context("historical backfill failed")?;

    if bars.is_empty() {
        bail!("backfill returned no bars for the configured range");
    }

    BarStore::new(config.bars_path()).save(&bars)?;
    info!(path = %config.bars_path().display(), bars = bars.len(), "fetch complete");
    Ok(())
}

/// Replay the baseline policies over the stored series and report summaries.
fn backtest(config: &AppConfig) -> Result<()> {
    let bars = BarStore::new(config.bars_path())
        .load()
        .context("run `papertrader fetch` first to produce the bar artifact")?;

    let mut policies: Vec<Box<dyn Policy>> = vec![
        Box::new(VwapMomentumPolicy::new(0.001)),
        Box::new(RandomPolicy::new(42)),
    ];

    for policy in policies.iter_mut() {
        let mut env = TradingEnv::new(
            bars.clone(),
            config.simulation.initial_balance,
            config.sim_costs(),
        )?;
        let summary = evaluate_policy(&mut env, policy.as_mut())?;
        println!(
            "{:<16} steps={:<8} reward={:<14.2} profit={:<12.2} balance={:.2}",
            summary.policy,
            summary.steps,
            summary.total_reward,
            summary.total_profit,
            summary.final_balance
        );
    }

    Ok(())
}

/// Run the live loop until the operator interrupts.
async fn live(config: &AppConfig) -> Result<()> {
    let balance = prompt_starting_balance(config.live.initial_balance)?;

    let source = BinanceDataClient::from_config(&config.fetch)?;
    let policy = VwapMomentumPolicy::new(0.001);
    let mut trader = LiveTrader::new(
        source,
        policy,
        config.live_settings(),
        balance,
        config.live_costs(),
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("interrupt received, shutting down after the current tick");
        let _ = shutdown_tx.send(true);
    });

    trader.run(&mut shutdown_rx).await
}

/// Ask the operator for a positive starting balance, falling back to the
/// configured default on empty input.
fn prompt_starting_balance(default: f64) -> Result<f64> {
    print!("Enter the starting balance (USD) [{default}]: ");
    std::io::stdout().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read starting balance")?;

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }

    let balance: f64 = trimmed
        .parse()
        .with_context(|| format!("invalid balance {trimmed:?}"))?;
    if !(balance > 0.0) {
        bail!("starting balance must be positive, got {balance}");
    }
    Ok(balance)
}
