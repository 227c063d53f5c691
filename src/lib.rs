//! papertrader Library
//!
//! Paper-trading research harness: a deterministic simulation environment
//! for evaluating trading policies on historical bars, and a live execution
//! loop replaying a policy against polled quotes under solvency-gated
//! accounting. Both share one portfolio accounting model.

pub mod config;
pub mod data;
pub mod env;
pub mod live;
pub mod observation;
pub mod persistence;
pub mod policy;
pub mod portfolio;
pub mod retry;
pub mod types;
