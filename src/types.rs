//! Core types used throughout papertrader
//!
//! Defines the bar, action and observation structures shared by the
//! simulation environment and the live execution loop.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV sample plus the auxiliary fields Binance attaches to klines.
///
/// Bars are immutable once loaded; a series is ordered by `open_time` and
/// insertion order is chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Open time (start of period, milliseconds)
    pub open_time: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in base currency
    pub volume: f64,
    /// Close time (end of period, milliseconds)
    pub close_time: i64,
    /// Volume in quote currency
    pub quote_volume: f64,
    /// Number of trades in the period
    pub trades: u64,
    /// Taker buy volume in base currency
    pub taker_buy_base_volume: f64,
    /// Taker buy volume in quote currency
    pub taker_buy_quote_volume: f64,
}

impl fmt::Display for PriceBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = Utc
            .timestamp_millis_opt(self.open_time)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.open_time.to_string());
        write!(
            f,
            "{} O:{} H:{} L:{} C:{} V:{}",
            ts, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

/// Discrete trading action produced by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Do nothing this tick
    Hold,
    /// Increase the position by one unit (go long)
    Buy,
    /// Decrease the position by one unit (go short)
    Sell,
    /// Zero the position, realizing profit against the previous price
    Close,
}

impl Action {
    /// All actions, in discrete action-space index order.
    pub const ALL: [Action; 4] = [Action::Hold, Action::Buy, Action::Sell, Action::Close];

    /// Map a discrete action index (0..4) back to an action.
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Hold => write!(f, "HOLD"),
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Close => write!(f, "CLOSE"),
        }
    }
}

/// Fixed 5-element market observation fed to policies.
///
/// `[price, volume, rolling_high, rolling_low, vwap]` where the rolling
/// extrema cover the trailing window (or everything seen so far) and the
/// VWAP is cumulative from the start of the series or live session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Latest close price
    pub price: f64,
    /// Latest bar volume
    pub volume: f64,
    /// Trailing-window high
    pub rolling_high: f64,
    /// Trailing-window low
    pub rolling_low: f64,
    /// Cumulative volume-weighted average price
    pub vwap: f64,
}

impl Observation {
    /// The defined fallback when an observation would contain NaN/Inf.
    pub fn zeroed() -> Self {
        Self {
            price: 0.0,
            volume: 0.0,
            rolling_high: 0.0,
            rolling_low: 0.0,
            vwap: 0.0,
        }
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// The observation as the flat vector policies consume.
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.price,
            self.volume,
            self.rolling_high,
            self.rolling_low,
            self.vwap,
        ]
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "px={:.2} vol={:.4} hi={:.2} lo={:.2} vwap={:.2}",
            self.price, self.volume, self.rolling_high, self.rolling_low, self.vwap
        )
    }
}
