//! Portfolio Accounting Model
//!
//! The single place where an action mutates balance and position. Both the
//! simulation environment and the live execution loop apply trades through
//! [`apply_action`], so simulated and live economics always agree.
//!
//! Simulation mode allows unconstrained leverage and shorting for training
//! signal richness; live mode gates Buy on available balance and Sell on
//! held position, rejecting insolvent attempts as observable no-ops.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Action;

/// Transaction cost and sizing parameters shared by both loops.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    /// Commission as a fraction of notional (e.g. 0.001 = 0.1%)
    pub fee_rate: f64,
    /// Fixed quantity moved per Buy/Sell (e.g. 0.01 BTC)
    pub unit_size: f64,
}

/// Balance and position of one trading session or episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Current balance in quote currency (may go negative in simulation)
    pub balance: f64,
    /// Signed position: positive = long, negative = short
    pub position: f64,
    /// Fixed reference balance used for reward shaping and failure resets
    pub initial_balance: f64,
    /// Cumulative realized profit (simulation bookkeeping)
    pub total_profit: f64,
}

impl PortfolioState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            position: 0.0,
            initial_balance,
            total_profit: 0.0,
        }
    }

    /// Restore the state to its initial conditions.
    pub fn reset(&mut self) {
        self.balance = self.initial_balance;
        self.position = 0.0;
        self.total_profit = 0.0;
    }
}

impl fmt::Display for PortfolioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance={:.2} position={:.4}",
            self.balance, self.position
        )
    }
}

/// Which gating rules apply when a trade is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingMode {
    /// Unconstrained: balance may go negative, shorts are free
    Simulation,
    /// Solvency-gated: insufficient funds/position rejects the trade
    Live,
}

/// Why a live-mode trade was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientBalance,
    InsufficientPosition,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientBalance => write!(f, "not enough balance to buy"),
            RejectReason::InsufficientPosition => write!(f, "not enough position to sell"),
        }
    }
}

/// Result of one accounting rule application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeOutcome {
    /// The trade executed; `realized_pnl` is nonzero only for Close
    Filled { realized_pnl: f64 },
    /// Live gating refused the trade; state is unchanged
    Rejected(RejectReason),
    /// Hold, or Close with nothing to close; state is unchanged
    Noop,
}

impl TradeOutcome {
    /// Realized profit of this application (0 unless a position was closed).
    pub fn realized_pnl(&self) -> f64 {
        match self {
            TradeOutcome::Filled { realized_pnl } => *realized_pnl,
            _ => 0.0,
        }
    }
}

/// Apply exactly one accounting rule for `action`.
///
/// Balance and position are updated atomically: either the full trade
/// applies or nothing changes. `previous_price` is the close of the
/// preceding bar/tick; `Close` without one (first bar of an episode, or an
/// unseeded live session) is a no-op by design.
pub fn apply_action(
    state: &mut PortfolioState,
    action: Action,
    current_price: f64,
    previous_price: Option<f64>,
    costs: &CostModel,
    mode: AccountingMode,
) -> TradeOutcome {
    match action {
        Action::Hold => TradeOutcome::Noop,
        Action::Buy => {
            let cost = costs.unit_size * current_price * (1.0 + costs.fee_rate);
            if mode == AccountingMode::Live && state.balance < cost {
                return TradeOutcome::Rejected(RejectReason::InsufficientBalance);
            }
            state.position += costs.unit_size;
            state.balance -= cost;
            TradeOutcome::Filled { realized_pnl: 0.0 }
        }
        Action::Sell => {
            if mode == AccountingMode::Live && state.position < costs.unit_size {
                return TradeOutcome::Rejected(RejectReason::InsufficientPosition);
            }
            state.position -= costs.unit_size;
            state.balance += costs.unit_size * current_price * (1.0 - costs.fee_rate);
            TradeOutcome::Filled { realized_pnl: 0.0 }
        }
        Action::Close => {
            if state.position == 0.0 {
                return TradeOutcome::Noop;
            }
            let Some(prev) = previous_price else {
                return TradeOutcome::Noop;
            };
            let realized_pnl = (current_price - prev) * state.position;
            state.balance += realized_pnl;
            state.position = 0.0;
            TradeOutcome::Filled { realized_pnl }
        }
    }
}
