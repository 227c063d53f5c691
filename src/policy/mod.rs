//! Policy seam and baseline policies
//!
//! A policy is an opaque decision function: observation in, action out. The
//! trained model the harness ultimately serves plugs in behind the same
//! trait, so the simulation environment and the live loop never depend on
//! any specific learning algorithm.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::env::TradingEnv;
use crate::types::{Action, Observation};

/// Opaque decision function: state vector -> discrete action.
///
/// Implementations may keep internal state across calls, but from the
/// caller's perspective a decision is synchronous and side-effect-free.
pub trait Policy: Send {
    /// Identifier for logs and reports.
    fn name(&self) -> &'static str;

    /// Choose one action for the given observation.
    fn decide(&mut self, observation: &Observation) -> Result<Action>;
}

/// Uniform random policy, the exploration baseline.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn decide(&mut self, _observation: &Observation) -> Result<Action> {
        let idx = self.rng.gen_range(0..Action::ALL.len());
        Ok(Action::ALL[idx])
    }
}

/// VWAP momentum baseline: enter long when price breaks above VWAP by a
/// band, close the position when price falls back under VWAP.
#[derive(Debug)]
pub struct VwapMomentumPolicy {
    /// Relative breakout band over VWAP (e.g. 0.001 = 0.1%)
    band: f64,
    holding: bool,
}

impl VwapMomentumPolicy {
    pub fn new(band: f64) -> Self {
        Self {
            band,
            holding: false,
        }
    }
}

impl Policy for VwapMomentumPolicy {
    fn name(&self) -> &'static str {
        "vwap-momentum"
    }

    fn decide(&mut self, obs: &Observation) -> Result<Action> {
        if !self.holding && obs.price > obs.vwap * (1.0 + self.band) {
            self.holding = true;
            Ok(Action::Buy)
        } else if self.holding && obs.price < obs.vwap {
            self.holding = false;
            Ok(Action::Close)
        } else {
            Ok(Action::Hold)
        }
    }
}

/// Outcome of evaluating a policy over one full episode.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeSummary {
    pub policy: String,
    /// Environment steps taken
    pub steps: usize,
    /// Sum of per-step rewards (realized pnl + shaping)
    pub total_reward: f64,
    /// Cumulative realized profit
    pub total_profit: f64,
    /// Balance at episode end
    pub final_balance: f64,
    /// Position left open at episode end
    pub final_position: f64,
}

/// Run `policy` through one episode of `env` and summarize the trajectory.
pub fn evaluate_policy(env: &mut TradingEnv, policy: &mut dyn Policy) -> Result<EpisodeSummary> {
    let mut obs = env.reset();
    let mut steps = 0usize;
    let mut total_reward = 0.0;

    loop {
        let action = policy.decide(&obs)?;
        let result = env.step(action);
        obs = result.observation;
        steps += 1;
        total_reward += result.reward;
        if result.done {
            break;
        }
    }

    let summary = EpisodeSummary {
        policy: policy.name().to_string(),
        steps,
        total_reward,
        total_profit: env.portfolio().total_profit,
        final_balance: env.portfolio().balance,
        final_position: env.portfolio().position,
    };

    info!(
        policy = %summary.policy,
        steps = summary.steps,
        total_reward = summary.total_reward,
        total_profit = summary.total_profit,
        final_balance = summary.final_balance,
        "episode complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::CostModel;
    use crate::types::PriceBar;

    fn make_bar(ts: i64, close: f64) -> PriceBar {
        PriceBar {
            open_time: ts,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            close_time: ts + 59_999,
            quote_volume: close * 10.0,
            trades: 5,
            taker_buy_base_volume: 5.0,
            taker_buy_quote_volume: close * 5.0,
        }
    }

    fn test_env(closes: &[f64]) -> TradingEnv {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_bar(i as i64 * 60_000, c))
            .collect();
        TradingEnv::new(
            bars,
            10_000.0,
            CostModel {
                fee_rate: 0.0,
                unit_size: 1.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_random_policy_is_reproducible() {
        let obs = Observation::zeroed();
        let mut a = RandomPolicy::new(42);
        let mut b = RandomPolicy::new(42);
        for _ in 0..20 {
            assert_eq!(a.decide(&obs).unwrap(), b.decide(&obs).unwrap());
        }
    }

    #[test]
    fn test_momentum_policy_enters_and_exits() {
        let mut policy = VwapMomentumPolicy::new(0.001);

        let mut obs = Observation::zeroed();
        obs.price = 102.0;
        obs.vwap = 100.0;
        assert_eq!(policy.decide(&obs).unwrap(), Action::Buy);

        // Already holding: no re-entry while above VWAP.
        assert_eq!(policy.decide(&obs).unwrap(), Action::Hold);

        obs.price = 99.0;
        assert_eq!(policy.decide(&obs).unwrap(), Action::Close);
        assert_eq!(policy.decide(&obs).unwrap(), Action::Hold);
    }

    #[test]
    fn test_evaluate_policy_walks_full_episode() {
        let mut env = test_env(&[100.0, 101.0, 102.0, 103.0, 104.0]);

        struct AlwaysHold;
        impl Policy for AlwaysHold {
            fn name(&self) -> &'static str {
                "hold"
            }
            fn decide(&mut self, _o: &Observation) -> Result<Action> {
                Ok(Action::Hold)
            }
        }

        let summary = evaluate_policy(&mut env, &mut AlwaysHold).unwrap();
        assert_eq!(summary.steps, 4); // len - 1 steps to reach the final bar
        assert_eq!(summary.total_reward, 0.0);
        assert_eq!(summary.final_balance, 10_000.0);
        assert_eq!(summary.final_position, 0.0);
    }
}
