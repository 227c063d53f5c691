//! CSV persistence
//!
//! Stores the historical bar artifact produced by the backfill and loads it
//! back for the simulation environment. Columns mirror the exchange payload,
//! auxiliary fields included, so the artifact round-trips losslessly.

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::PriceBar;

/// File-backed store for one bar series.
#[derive(Debug, Clone)]
pub struct BarStore {
    path: PathBuf,
}

impl BarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full series, replacing any existing artifact.
    pub fn save(&self, bars: &[PriceBar]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("failed to open {} for writing", self.path.display()))?;

        for bar in bars {
            writer
                .serialize(bar)
                .context("failed to serialize price bar")?;
        }
        writer.flush().context("failed to flush bar CSV")?;

        info!(path = %self.path.display(), bars = bars.len(), "saved bar series");
        Ok(())
    }

    /// Load the series, sorted by open time. An empty artifact is an error:
    /// the environment cannot run without data.
    pub fn load(&self) -> Result<Vec<PriceBar>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let mut bars: Vec<PriceBar> = Vec::new();
        for record in reader.deserialize() {
            let bar: PriceBar = record.context("failed to parse price bar row")?;
            bars.push(bar);
        }

        if bars.is_empty() {
            bail!("bar series at {} is empty", self.path.display());
        }

        bars.sort_by_key(|b| b.open_time);
        info!(path = %self.path.display(), bars = bars.len(), "loaded bar series");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(ts: i64, close: f64) -> PriceBar {
        PriceBar {
            open_time: ts,
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            close_time: ts + 59_999,
            quote_volume: close * 10.0,
            trades: 42,
            taker_buy_base_volume: 5.0,
            taker_buy_quote_volume: close * 5.0,
        }
    }

    fn temp_store(name: &str) -> BarStore {
        let mut path = std::env::temp_dir();
        path.push(format!("papertrader-test-{}-{}.csv", name, std::process::id()));
        BarStore::new(path)
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = temp_store("roundtrip");
        let bars = vec![make_bar(0, 100.0), make_bar(60_000, 101.0)];

        store.save(&bars).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, bars);

        fs::remove_file(store.path()).ok();
    }

    #[test]
    fn test_load_sorts_by_open_time() {
        let store = temp_store("sort");
        let bars = vec![make_bar(120_000, 102.0), make_bar(0, 100.0)];

        store.save(&bars).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].open_time, 0);
        assert_eq!(loaded[1].open_time, 120_000);

        fs::remove_file(store.path()).ok();
    }

    #[test]
    fn test_empty_artifact_is_an_error() {
        let store = temp_store("empty");
        store.save(&[]).unwrap();
        assert!(store.load().is_err());

        fs::remove_file(store.path()).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let store = BarStore::new("/nonexistent/papertrader.csv");
        assert!(store.load().is_err());
    }
}
