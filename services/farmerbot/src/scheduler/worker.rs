//! Reconciliation background worker.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, instrument, Span};

use super::refresher::{NodeRefresher, RefreshSummary};
use crate::managers::{PowerDecision, PowerManager, WakeupOutcome};

/// What one reconciliation round did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub refresh: Option<RefreshSummary>,
    pub wakeup: Option<WakeupOutcome>,
    pub power: Option<PowerDecision>,
    pub errors: Vec<String>,
}

impl RoundReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self
                .refresh
                .as_ref()
                .is_none_or(|refresh| refresh.anomalies.is_empty())
    }
}

/// Worker that runs reconciliation rounds until shutdown.
pub struct ReconcileWorker {
    refresher: NodeRefresher,
    power: PowerManager,
    interval: Duration,
    span: Span,
}

impl ReconcileWorker {
    pub fn new(refresher: NodeRefresher, power: PowerManager, interval: Duration, span: Span) -> Self {
        Self {
            refresher,
            power,
            interval,
            span,
        }
    }

    /// Run rounds until shutdown is signaled.
    #[instrument(parent = &self.span, skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting reconcile worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single round: refresh, periodic wake-up, power management.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn run_once(&self) -> RoundReport {
        let started = Instant::now();
        let mut report = RoundReport::default();

        match self.refresher.refresh_all().await {
            Ok(summary) => report.refresh = Some(summary),
            Err(e) => {
                error!(error = %e, "Failed to refresh nodes");
                report.errors.push(format!("refresh: {e}"));
                return report;
            }
        }

        match self.power.periodic_wakeup().await {
            Ok(outcome) => report.wakeup = Some(outcome),
            Err(e) => {
                error!(error = %e, "Failed to perform periodic wake up");
                report.errors.push(format!("periodic wakeup: {e}"));
            }
        }

        match self.power.power_management().await {
            Ok(decision) => report.power = Some(decision),
            Err(e) => {
                error!(error = %e, "Failed to power manage nodes");
                report.errors.push(format!("power management: {e}"));
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            errors = report.errors.len(),
            "Reconciliation round complete"
        );
        report
    }
}
