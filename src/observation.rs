//! Observation construction
//!
//! Builds the 5-element market observation from a bar series (simulation)
//! or from an incremental live session (VWAP accumulator). Both paths apply
//! the same sanitization rule: no NaN/Inf ever leaves this module.

use crate::types::{Observation, PriceBar};

/// Trailing window for the rolling high/low, in bars.
pub const ROLLING_WINDOW: usize = 60;

/// Compute the observation for the bar at `idx`.
///
/// The rolling extrema use the trailing [`ROLLING_WINDOW`] bars, or every bar
/// seen so far when fewer exist. VWAP is cumulative from the start of the
/// series up to and including `idx`, falling back to the raw close when the
/// cumulative volume is zero. A non-finite result collapses to the zero
/// vector.
pub fn observation_at(bars: &[PriceBar], idx: usize) -> Observation {
    let Some(bar) = bars.get(idx) else {
        return Observation::zeroed();
    };

    let window_start = idx.saturating_sub(ROLLING_WINDOW - 1);
    let window = &bars[window_start..=idx];

    let rolling_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let rolling_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    let mut cum_volume = 0.0;
    let mut cum_price_volume = 0.0;
    for b in &bars[..=idx] {
        cum_volume += b.volume;
        cum_price_volume += b.close * b.volume;
    }
    let vwap = if cum_volume != 0.0 {
        cum_price_volume / cum_volume
    } else {
        bar.close
    };

    let obs = Observation {
        price: bar.close,
        volume: bar.volume,
        rolling_high,
        rolling_low,
        vwap,
    };

    if obs.is_finite() {
        obs
    } else {
        Observation::zeroed()
    }
}

/// Session-cumulative VWAP state for the live loop.
///
/// The simulation recomputes VWAP from the series start; the live loop has no
/// series, so it accumulates from the start of the session instead. The
/// circuit breaker resets it together with the price baseline.
#[derive(Debug, Clone, Default)]
pub struct VwapAccumulator {
    cum_volume: f64,
    cum_price_volume: f64,
}

impl VwapAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick into the session and return the current VWAP.
    ///
    /// Falls back to the raw price while the cumulative volume is zero.
    pub fn push(&mut self, price: f64, volume: f64) -> f64 {
        self.cum_volume += volume;
        self.cum_price_volume += price * volume;
        if self.cum_volume != 0.0 {
            self.cum_price_volume / self.cum_volume
        } else {
            price
        }
    }

    /// Drop all session state (fresh baseline after a failure reset).
    pub fn reset(&mut self) {
        self.cum_volume = 0.0;
        self.cum_price_volume = 0.0;
    }
}
