//! Market Simulation Environment
//!
//! A deterministic, replayable gym-style state machine over a fixed
//! historical bar series. A policy-training or evaluation loop repeatedly
//! calls [`TradingEnv::reset`] and [`TradingEnv::step`]; each episode is a
//! single forward pass over the configured slice of the series.

use anyhow::{bail, Result};
use tracing::debug;

use crate::observation::observation_at;
use crate::portfolio::{apply_action, AccountingMode, CostModel, PortfolioState};
use crate::types::{Action, Observation, PriceBar};

/// Per-step bonus applied to equity above the initial balance. Rewards
/// sustained profitability independent of the triggering action.
const EQUITY_SHAPING_COEFF: f64 = 0.01;

/// Result of one environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    /// Observation at the new cursor position
    pub observation: Observation,
    /// Realized profit of this step plus the equity shaping bonus
    pub reward: f64,
    /// True once the cursor has reached the final bar
    pub done: bool,
}

/// Trading simulation environment over an immutable bar series.
#[derive(Debug, Clone)]
pub struct TradingEnv {
    bars: Vec<PriceBar>,
    costs: CostModel,
    portfolio: PortfolioState,
    cursor: usize,
}

impl TradingEnv {
    /// Build an environment over `bars`.
    ///
    /// Requires at least two bars; a one-bar episode would be done before the
    /// first step.
    pub fn new(bars: Vec<PriceBar>, initial_balance: f64, costs: CostModel) -> Result<Self> {
        if bars.len() < 2 {
            bail!(
                "environment needs at least 2 bars, got {}",
                bars.len()
            );
        }
        if !(initial_balance > 0.0) {
            bail!("initial balance must be positive, got {initial_balance}");
        }
        Ok(Self {
            bars,
            costs,
            portfolio: PortfolioState::new(initial_balance),
            cursor: 0,
        })
    }

    /// Restart the episode: cursor to bar 0, balance to the initial balance,
    /// flat position, zero cumulative profit. Returns the first observation.
    pub fn reset(&mut self) -> Observation {
        self.cursor = 0;
        self.portfolio.reset();
        debug!(bars = self.bars.len(), "environment reset");
        self.observation()
    }

    /// Apply one action at the current bar, then advance time.
    ///
    /// The step at the final index still executes its action (a `Close`
    /// against the previous bar is the canonical episode ending) but the
    /// cursor never moves past the series end.
    pub fn step(&mut self, action: Action) -> StepResult {
        let current_price = self.bars[self.cursor].close;
        let previous_price = self
            .cursor
            .checked_sub(1)
            .map(|prev| self.bars[prev].close);

        let outcome = apply_action(
            &mut self.portfolio,
            action,
            current_price,
            previous_price,
            &self.costs,
            AccountingMode::Simulation,
        );
        let realized = outcome.realized_pnl();
        self.portfolio.total_profit += realized;

        let mut reward = realized
            + EQUITY_SHAPING_COEFF * (self.portfolio.balance - self.portfolio.initial_balance).max(0.0);
        if !reward.is_finite() {
            reward = 0.0;
        }

        // Never past the final bar.
        self.cursor = (self.cursor + 1).min(self.bars.len() - 1);

        StepResult {
            observation: self.observation(),
            reward,
            done: self.done(),
        }
    }

    /// Observation for the current cursor position.
    pub fn observation(&self) -> Observation {
        observation_at(&self.bars, self.cursor)
    }

    /// True once the cursor sits on the final bar.
    pub fn done(&self) -> bool {
        self.cursor >= self.bars.len() - 1
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of bars in the configured series.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
