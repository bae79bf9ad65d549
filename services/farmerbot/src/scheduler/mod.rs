//! Reconciliation loop.
//!
//! Each round refreshes every node from its agent and the chain, then runs
//! the daily wake-up and power management. Rounds run on a fixed interval;
//! a failed round is logged and the next one starts on schedule.

mod refresher;
mod worker;

pub use refresher::{NodeRefresher, RefreshSummary, DEFAULT_REFRESH_CONCURRENCY};
pub use worker::{ReconcileWorker, RoundReport};
