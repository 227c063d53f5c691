//! Binance market data clients
//!
//! REST access to the klines endpoint, in two shapes: a paginated,
//! retry-bounded historical backfill producing the CSV artifact the
//! simulation consumes, and a polled live quote source for the execution
//! loop. Both are plain read-only endpoints; no credentials are required.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::observation::ROLLING_WINDOW;
use crate::retry::RetryPolicy;
use crate::types::PriceBar;

const KLINES_PATH: &str = "/api/v3/klines";

/// One-minute bar period in milliseconds, the backfill's unit of progress.
const BAR_PERIOD_MS: i64 = 60_000;

/// Most recent market snapshot for one symbol: last bar close/volume plus
/// the trailing-window extrema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveQuote {
    pub close: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
}

/// Live quote acquisition failure. Transient errors are retried by the
/// caller; "no data yet" is a distinct, equally retryable condition.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("transient quote failure: {0}")]
    Transient(String),
    #[error("no data available yet")]
    NoData,
}

/// Source of fresh market observations for the live loop.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &'static str;

    /// Fetch the most recent quote for `symbol`.
    async fn latest_quote(&self, symbol: &str) -> Result<LiveQuote, QuoteError>;
}

/// REST client for Binance klines.
#[derive(Debug, Clone)]
pub struct BinanceDataClient {
    client: reqwest::Client,
    base_url: String,
    /// Bars per backfill request (Binance caps at 1000)
    chunk_limit: usize,
    /// Retry budget around each backfill chunk
    retry: RetryPolicy,
    /// Pause between backfill chunks to respect rate limits
    rate_limit_pause: Duration,
}

impl BinanceDataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            chunk_limit: 1000,
            retry: RetryPolicy::bounded(5, Duration::from_secs(1)),
            rate_limit_pause: Duration::from_millis(500),
        })
    }

    pub fn from_config(cfg: &FetchConfig) -> Result<Self> {
        let mut client = Self::new(cfg.base_url.clone())?;
        client.chunk_limit = cfg.chunk_limit;
        client.retry = RetryPolicy::bounded(
            cfg.max_retry_attempts,
            Duration::from_millis(cfg.retry_backoff_ms),
        );
        client.rate_limit_pause = Duration::from_millis(cfg.rate_limit_pause_ms);
        Ok(client)
    }

    /// Fetch one chunk of klines.
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<PriceBar>> {
        let url = format!("{}{}", self.base_url, KLINES_PATH);
        let mut params: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(start) = start_ms {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_ms {
            params.push(("endTime", end.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            bail!("Binance API returned error: {}", response.status());
        }

        let klines: Vec<Vec<Value>> = response
            .json()
            .await
            .context("failed to parse Binance klines response")?;

        Ok(klines
            .iter()
            .filter_map(|row| parse_kline_row(row))
            .collect())
    }

    /// Download the full bar series for a date range, in bounded chunks.
    ///
    /// Pagination resumes from the open time of the last fetched bar plus
    /// one, which makes the download idempotent under retry. Each chunk is
    /// wrapped in the bounded retry policy; exhausting it aborts the
    /// backfill with the bars fetched so far discarded into the error.
    pub async fn backfill(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<PriceBar>> {
        if start_ms >= end_ms {
            bail!("backfill range is empty: {start_ms}..{end_ms}");
        }

        let expected = ((end_ms - start_ms) / BAR_PERIOD_MS).max(1);
        info!(
            symbol,
            interval,
            start_ms,
            end_ms,
            expected_bars = expected,
            "starting historical backfill"
        );

        let mut all_bars: Vec<PriceBar> = Vec::new();
        let mut cursor = start_ms;

        while cursor < end_ms {
            let chunk = self
                .retry
                .run("fetch klines chunk", || {
                    self.fetch_klines(symbol, interval, Some(cursor), Some(end_ms), self.chunk_limit)
                })
                .await?;

            let Some(last) = chunk.last() else {
                debug!(cursor, "no more klines returned, backfill done");
                break;
            };

            cursor = last.open_time + 1;
            all_bars.extend(chunk);

            info!(
                fetched = all_bars.len(),
                expected_bars = expected,
                progress_pct = (all_bars.len() as f64 / expected as f64 * 100.0).min(100.0),
                "backfill progress"
            );

            tokio::time::sleep(self.rate_limit_pause).await;
        }

        info!(symbol, bars = all_bars.len(), "historical backfill complete");
        Ok(all_bars)
    }
}

#[async_trait]
impl QuoteSource for BinanceDataClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn latest_quote(&self, symbol: &str) -> Result<LiveQuote, QuoteError> {
        let bars = self
            .fetch_klines(symbol, "1m", None, None, ROLLING_WINDOW)
            .await
            .map_err(|e| QuoteError::Transient(e.to_string()))?;

        quote_from_bars(&bars).ok_or(QuoteError::NoData)
    }
}

/// Collapse a trailing kline window into a live quote: last close/volume,
/// window high/low. Empty or non-finite windows yield `None`.
pub fn quote_from_bars(bars: &[PriceBar]) -> Option<LiveQuote> {
    let last = bars.last()?;
    let quote = LiveQuote {
        close: last.close,
        volume: last.volume,
        high: bars.iter().map(|b| b.high).fold(f64::MIN, f64::max),
        low: bars.iter().map(|b| b.low).fold(f64::MAX, f64::min),
    };
    let finite = [quote.close, quote.volume, quote.high, quote.low]
        .iter()
        .all(|v| v.is_finite());
    finite.then_some(quote)
}

/// Parse one kline row from the array-of-arrays payload:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
/// trades, taker_buy_base, taker_buy_quote, ignore]`.
fn parse_kline_row(row: &[Value]) -> Option<PriceBar> {
    if row.len() < 11 {
        return None;
    }

    let as_f64 = |v: &Value| -> Option<f64> {
        v.as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| v.as_f64())
    };

    Some(PriceBar {
        open_time: row[0].as_i64()?,
        open: as_f64(&row[1])?,
        high: as_f64(&row[2])?,
        low: as_f64(&row[3])?,
        close: as_f64(&row[4])?,
        volume: as_f64(&row[5])?,
        close_time: row[6].as_i64()?,
        quote_volume: as_f64(&row[7])?,
        trades: row[8].as_u64()?,
        taker_buy_base_volume: as_f64(&row[9])?,
        taker_buy_quote_volume: as_f64(&row[10])?,
    })
}
