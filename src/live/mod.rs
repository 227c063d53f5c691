//! Live Execution Loop
//!
//! Replays a trained policy against a live quote source, one tick per bar
//! period, applying the shared accounting model in its solvency-gated
//! variant. The loop tolerates data-source failures indefinitely: a failed
//! tick is logged, backed off, and retried without advancing any state.
//! Termination happens only through the cooperative shutdown signal,
//! checked between ticks.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::data::{QuoteError, QuoteSource};
use crate::observation::VwapAccumulator;
use crate::policy::Policy;
use crate::portfolio::{apply_action, AccountingMode, CostModel, PortfolioState, TradeOutcome};
use crate::types::{Action, Observation};

/// Live loop timing and market parameters.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// Symbol to trade, e.g. "BTCUSDT"
    pub symbol: String,
    /// One bar period between ticks
    pub tick_interval: Duration,
    /// Short pause before retrying a failed tick
    pub error_backoff: Duration,
}

/// What one tick did. Failed variants retry the same tick after the error
/// backoff; the others wait a full tick interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickReport {
    /// Quote acquisition failed; nothing advanced
    FetchFailed,
    /// Observation contained non-finite values; skipped
    SkippedNonFinite,
    /// First successful observation seeded the price baseline; no decision
    Seeded,
    /// The decision function failed; nothing advanced
    DecisionFailed,
    /// A decision was applied (filled, rejected or no-op)
    Traded {
        action: Action,
        outcome: TradeOutcome,
    },
}

/// Paper-trading session driving an opaque policy from live quotes.
pub struct LiveTrader<Q: QuoteSource, P: Policy> {
    source: Q,
    policy: P,
    settings: LiveSettings,
    costs: CostModel,
    portfolio: PortfolioState,
    previous_price: Option<f64>,
    vwap: VwapAccumulator,
}

impl<Q: QuoteSource, P: Policy> LiveTrader<Q, P> {
    pub fn new(
        source: Q,
        policy: P,
        settings: LiveSettings,
        initial_balance: f64,
        costs: CostModel,
    ) -> Self {
        Self {
            source,
            policy,
            settings,
            costs,
            portfolio: PortfolioState::new(initial_balance),
            previous_price: None,
            vwap: VwapAccumulator::new(),
        }
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn previous_price(&self) -> Option<f64> {
        self.previous_price
    }

    /// Run until `shutdown` flips to true. Every tick error is absorbed
    /// here; the loop itself never fails.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        info!(
            symbol = %self.settings.symbol,
            tick_interval_secs = self.settings.tick_interval.as_secs(),
            balance = self.portfolio.balance,
            "live execution loop starting"
        );

        loop {
            if *shutdown.borrow() {
                info!(
                    balance = self.portfolio.balance,
                    position = self.portfolio.position,
                    "shutdown requested, exiting live loop"
                );
                return Ok(());
            }

            let report = self.tick().await;
            let pause = match report {
                TickReport::FetchFailed
                | TickReport::SkippedNonFinite
                | TickReport::DecisionFailed => self.settings.error_backoff,
                _ => self.settings.tick_interval,
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Execute one tick: acquire, seed or decide, apply, detect failure.
    pub async fn tick(&mut self) -> TickReport {
        let quote = match self.source.latest_quote(&self.settings.symbol).await {
            Ok(quote) => quote,
            Err(QuoteError::NoData) => {
                info!(source = self.source.name(), "no quote data yet, waiting");
                return TickReport::FetchFailed;
            }
            Err(err @ QuoteError::Transient(_)) => {
                warn!(source = self.source.name(), error = %err, "quote fetch failed");
                return TickReport::FetchFailed;
            }
        };

        let raw = [quote.close, quote.volume, quote.high, quote.low];
        if raw.iter().any(|v| !v.is_finite()) {
            warn!(?quote, "non-finite quote, skipping tick");
            return TickReport::SkippedNonFinite;
        }

        let vwap = self.vwap.push(quote.close, quote.volume);
        let obs = Observation {
            price: quote.close,
            volume: quote.volume,
            rolling_high: quote.high,
            rolling_low: quote.low,
            vwap,
        };

        // No trade decision before a price baseline exists.
        if self.previous_price.is_none() {
            self.previous_price = Some(obs.price);
            info!(price = obs.price, "price baseline seeded");
            return TickReport::Seeded;
        }

        let action = match self.policy.decide(&obs) {
            Ok(action) => action,
            Err(err) => {
                error!(policy = self.policy.name(), error = %err, "decision function failed");
                return TickReport::DecisionFailed;
            }
        };

        let outcome = apply_action(
            &mut self.portfolio,
            action,
            obs.price,
            self.previous_price,
            &self.costs,
            AccountingMode::Live,
        );

        match &outcome {
            TradeOutcome::Filled { realized_pnl } => info!(
                action = %action,
                price = obs.price,
                realized_pnl,
                balance = self.portfolio.balance,
                position = self.portfolio.position,
                "trade applied"
            ),
            TradeOutcome::Rejected(reason) => {
                info!(action = %action, price = obs.price, %reason, "trade rejected")
            }
            TradeOutcome::Noop => debug!(action = %action, price = obs.price, "no-op tick"),
        }

        if self.portfolio.balance < 0.0 {
            // Circuit breaker: a solvency breach resets the whole session,
            // forcing a fresh baseline on the next successful fetch.
            warn!(
                balance = self.portfolio.balance,
                "failure detected: balance below zero, resetting session"
            );
            self.portfolio.balance = self.portfolio.initial_balance;
            self.portfolio.position = 0.0;
            self.previous_price = None;
            self.vwap.reset();
        } else {
            self.previous_price = Some(obs.price);
        }

        TickReport::Traded { action, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LiveQuote;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<LiveQuote, QuoteError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<LiveQuote, QuoteError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl QuoteSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn latest_quote(&self, _symbol: &str) -> Result<LiveQuote, QuoteError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(QuoteError::Transient("script exhausted".to_string())))
        }
    }

    struct ScriptedPolicy {
        actions: VecDeque<Action>,
        calls: usize,
    }

    impl ScriptedPolicy {
        fn new(actions: Vec<Action>) -> Self {
            Self {
                actions: actions.into(),
                calls: 0,
            }
        }
    }

    impl Policy for ScriptedPolicy {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn decide(&mut self, _obs: &Observation) -> Result<Action> {
            self.calls += 1;
            Ok(self.actions.pop_front().unwrap_or(Action::Hold))
        }
    }

    fn quote(close: f64) -> LiveQuote {
        LiveQuote {
            close,
            volume: 1.0,
            high: close + 1.0,
            low: close - 1.0,
        }
    }

    fn settings() -> LiveSettings {
        LiveSettings {
            symbol: "BTCUSDT".to_string(),
            tick_interval: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
        }
    }

    const COSTS: CostModel = CostModel {
        fee_rate: 0.0,
        unit_size: 1.0,
    };

    #[tokio::test]
    async fn test_fetch_failure_does_not_consume_a_decision() {
        let source = ScriptedSource::new(vec![
            Err(QuoteError::Transient("timeout".to_string())),
            Ok(quote(100.0)),
            Ok(quote(101.0)),
        ]);
        let policy = ScriptedPolicy::new(vec![Action::Hold]);
        let mut trader = LiveTrader::new(source, policy, settings(), 1_000.0, COSTS);

        assert_eq!(trader.tick().await, TickReport::FetchFailed);
        assert_eq!(trader.previous_price(), None);
        assert_eq!(trader.policy.calls, 0);

        // First successful observation only seeds the baseline.
        assert_eq!(trader.tick().await, TickReport::Seeded);
        assert_eq!(trader.previous_price(), Some(100.0));
        assert_eq!(trader.policy.calls, 0);

        // Decisions start on the tick after the seed.
        let report = trader.tick().await;
        assert!(matches!(report, TickReport::Traded { .. }));
        assert_eq!(trader.policy.calls, 1);
        assert_eq!(trader.previous_price(), Some(101.0));
    }

    #[tokio::test]
    async fn test_no_data_is_retried_like_a_transient_failure() {
        let source = ScriptedSource::new(vec![Err(QuoteError::NoData)]);
        let policy = ScriptedPolicy::new(vec![]);
        let mut trader = LiveTrader::new(source, policy, settings(), 1_000.0, COSTS);

        assert_eq!(trader.tick().await, TickReport::FetchFailed);
        assert_eq!(trader.previous_price(), None);
    }

    #[tokio::test]
    async fn test_rejected_trade_leaves_state_unchanged() {
        let source = ScriptedSource::new(vec![Ok(quote(100.0)), Ok(quote(100.0))]);
        let policy = ScriptedPolicy::new(vec![Action::Sell]);
        let mut trader = LiveTrader::new(source, policy, settings(), 1_000.0, COSTS);

        trader.tick().await; // seed
        let report = trader.tick().await;
        assert!(matches!(
            report,
            TickReport::Traded {
                outcome: TradeOutcome::Rejected(_),
                ..
            }
        ));
        assert_eq!(trader.portfolio().balance, 1_000.0);
        assert_eq!(trader.portfolio().position, 0.0);
    }

    #[tokio::test]
    async fn test_circuit_breaker_resets_session() {
        // Seed at 4, buy one unit at 4, then close at 2 against the
        // previous price 4: pnl = -2 on a balance of 1 trips the breaker.
        let source = ScriptedSource::new(vec![
            Ok(quote(4.0)),
            Ok(quote(4.0)),
            Ok(quote(2.0)),
            Ok(quote(7.0)),
        ]);
        let policy = ScriptedPolicy::new(vec![Action::Buy, Action::Close]);
        let mut trader = LiveTrader::new(source, policy, settings(), 5.0, COSTS);

        assert_eq!(trader.tick().await, TickReport::Seeded);

        trader.tick().await; // Buy: balance 1, position 1
        assert_eq!(trader.portfolio().balance, 1.0);
        assert_eq!(trader.portfolio().position, 1.0);

        trader.tick().await; // Close at 2 vs prev 4: balance -1 -> reset
        assert_eq!(trader.portfolio().balance, 5.0);
        assert_eq!(trader.portfolio().position, 0.0);
        assert_eq!(trader.previous_price(), None);

        // Next successful fetch re-seeds the baseline.
        assert_eq!(trader.tick().await, TickReport::Seeded);
        assert_eq!(trader.previous_price(), Some(7.0));
    }

    #[tokio::test]
    async fn test_non_finite_quote_is_skipped() {
        let source = ScriptedSource::new(vec![Ok(LiveQuote {
            close: f64::NAN,
            volume: 1.0,
            high: 1.0,
            low: 1.0,
        })]);
        let policy = ScriptedPolicy::new(vec![]);
        let mut trader = LiveTrader::new(source, policy, settings(), 1_000.0, COSTS);

        assert_eq!(trader.tick().await, TickReport::SkippedNonFinite);
        assert_eq!(trader.previous_price(), None);
        assert_eq!(trader.policy.calls, 0);
    }

    #[tokio::test]
    async fn test_decision_failure_is_contained() {
        struct FailingPolicy;
        impl Policy for FailingPolicy {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn decide(&mut self, _obs: &Observation) -> Result<Action> {
                Err(anyhow!("model inference crashed"))
            }
        }

        let source = ScriptedSource::new(vec![Ok(quote(100.0)), Ok(quote(101.0))]);
        let mut trader = LiveTrader::new(source, FailingPolicy, settings(), 1_000.0, COSTS);

        trader.tick().await; // seed
        assert_eq!(trader.tick().await, TickReport::DecisionFailed);
        // The failed tick advanced nothing.
        assert_eq!(trader.previous_price(), Some(100.0));
        assert_eq!(trader.portfolio().balance, 1_000.0);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let source = ScriptedSource::new(vec![]);
        let policy = ScriptedPolicy::new(vec![]);
        let mut trader = LiveTrader::new(source, policy, settings(), 1_000.0, COSTS);

        let (tx, mut rx) = watch::channel(true);
        trader.run(&mut rx).await.unwrap();
        drop(tx);
    }
}
