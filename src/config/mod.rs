//! Configuration management for papertrader
//!
//! Loads from layered sources: built-in defaults, optional config files
//! (`config/default.*`, `config/local.*`) and `PAPERTRADER__*` environment
//! variables, with `.env` support via dotenvy.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::live::LiveSettings;
use crate::portfolio::CostModel;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub simulation: SimulationConfig,
    pub live: LiveConfig,
    pub fetch: FetchConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Trading pair symbol, e.g. "BTCUSDT"
    pub symbol: String,
    /// Kline interval, e.g. "1m"
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Starting balance for each episode
    pub initial_balance: f64,
    /// Commission as a fraction of notional
    pub fee_rate: f64,
    /// Quantity per Buy/Sell action
    pub unit_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// Default starting balance when the operator prompt is skipped
    pub initial_balance: f64,
    /// Commission as a fraction of notional
    pub fee_rate: f64,
    /// Quantity per Buy/Sell action (exchange minimum trade size)
    pub unit_size: f64,
    /// Seconds between ticks (one bar period)
    pub tick_interval_secs: u64,
    /// Seconds to back off after a failed tick
    pub error_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// REST API base URL
    pub base_url: String,
    /// Bars per request (exchange cap is 1000)
    pub chunk_limit: usize,
    /// Bounded retry attempts per chunk
    pub max_retry_attempts: u32,
    /// Backoff between chunk retries in milliseconds
    pub retry_backoff_ms: u64,
    /// Pause between chunks in milliseconds (rate limiting)
    pub rate_limit_pause_ms: u64,
    /// Backfill range start, `YYYY-MM-DD`
    pub start_date: String,
    /// Backfill range end, `YYYY-MM-DD`; empty means "now"
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for artifacts
    pub data_dir: String,
    /// File name of the historical bar CSV
    pub bars_file: String,
}

impl AppConfig {
    /// Load configuration from defaults, files and environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Market defaults
            .set_default("market.symbol", "BTCUSDT")?
            .set_default("market.interval", "1m")?
            // Simulation defaults
            .set_default("simulation.initial_balance", 10_000.0)?
            .set_default("simulation.fee_rate", 0.001)?
            .set_default("simulation.unit_size", 1.0)?
            // Live defaults
            .set_default("live.initial_balance", 1_000.0)?
            .set_default("live.fee_rate", 0.001)?
            .set_default("live.unit_size", 0.01)?
            .set_default("live.tick_interval_secs", 60)?
            .set_default("live.error_backoff_secs", 5)?
            // Fetch defaults
            .set_default("fetch.base_url", "https://api.binance.com")?
            .set_default("fetch.chunk_limit", 1000)?
            .set_default("fetch.max_retry_attempts", 5)?
            .set_default("fetch.retry_backoff_ms", 1000)?
            .set_default("fetch.rate_limit_pause_ms", 500)?
            .set_default("fetch.start_date", "2021-01-01")?
            .set_default("fetch.end_date", "")?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.bars_file", "btc_historical_data.csv")?
            // Load config files if present
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PAPERTRADER__*)
            .add_source(Environment::with_prefix("PAPERTRADER").separator("__"))
            .build()
            .context("failed to build configuration")?;

        config
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// One-line summary for startup logging.
    pub fn digest(&self) -> String {
        format!(
            "symbol={} interval={} sim_balance={:.0} live_unit={} tick={}s",
            self.market.symbol,
            self.market.interval,
            self.simulation.initial_balance,
            self.live.unit_size,
            self.live.tick_interval_secs
        )
    }

    /// Path to the historical bar artifact.
    pub fn bars_path(&self) -> PathBuf {
        PathBuf::from(&self.persistence.data_dir).join(&self.persistence.bars_file)
    }

    pub fn sim_costs(&self) -> CostModel {
        CostModel {
            fee_rate: self.simulation.fee_rate,
            unit_size: self.simulation.unit_size,
        }
    }

    pub fn live_costs(&self) -> CostModel {
        CostModel {
            fee_rate: self.live.fee_rate,
            unit_size: self.live.unit_size,
        }
    }

    pub fn live_settings(&self) -> LiveSettings {
        LiveSettings {
            symbol: self.market.symbol.clone(),
            tick_interval: Duration::from_secs(self.live.tick_interval_secs),
            error_backoff: Duration::from_secs(self.live.error_backoff_secs),
        }
    }

    /// Backfill range as millisecond timestamps; an empty end date means
    /// "up to now".
    pub fn fetch_range(&self) -> Result<(i64, i64)> {
        let start = parse_date_ms(&self.fetch.start_date)
            .with_context(|| format!("invalid fetch.start_date: {}", self.fetch.start_date))?;
        let end = if self.fetch.end_date.trim().is_empty() {
            Utc::now().timestamp_millis()
        } else {
            parse_date_ms(&self.fetch.end_date)
                .with_context(|| format!("invalid fetch.end_date: {}", self.fetch.end_date))?
        };
        if start >= end {
            bail!("fetch range is empty: {} >= {}", start, end);
        }
        Ok((start, end))
    }
}

fn parse_date_ms(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").context("expected YYYY-MM-DD")?;
    let dt = date
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight timestamp")?;
    Ok(dt.and_utc().timestamp_millis())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() {
        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg.market.symbol, "BTCUSDT");
        assert_eq!(cfg.simulation.unit_size, 1.0);
        assert_eq!(cfg.live.unit_size, 0.01);
        assert!(cfg.digest().contains("BTCUSDT"));
    }

    #[test]
    fn test_fetch_range_defaults_to_now() {
        let cfg = AppConfig::load().unwrap();
        let (start, end) = cfg.fetch_range().unwrap();
        assert!(start < end);
    }

    #[test]
    fn test_parse_date_ms() {
        // 2021-01-01T00:00:00Z
        assert_eq!(parse_date_ms("2021-01-01").unwrap(), 1_609_459_200_000);
        assert!(parse_date_ms("not-a-date").is_err());
    }

    #[test]
    fn test_bars_path_joins_dir_and_file() {
        let cfg = AppConfig::load().unwrap();
        assert!(cfg.bars_path().ends_with("btc_historical_data.csv"));
    }
}
