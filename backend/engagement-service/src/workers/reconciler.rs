//! Counter Reconciliation Background Job
//!
//! Drains the drift registry on a fixed interval and recomputes each pending
//! counter from its event log. Pairs that cannot be reconciled stay pending
//! and are retried on the next round.

use crate::services::EngagementLedger;
use std::time::Duration;
use tokio::time::sleep;

const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: RECONCILE_INTERVAL,
        }
    }
}

/// Run one reconciliation round. Returns true if every pending counter was
/// reconciled.
pub async fn reconcile_once(ledger: &EngagementLedger) -> bool {
    if ledger.drift().is_empty() {
        return true;
    }

    let (reconciled, failed) = ledger.reconcile_pending().await;
    tracing::info!(reconciled, failed, "Counter reconciliation round finished");
    failed == 0
}

/// Start the reconciliation loop; returns only when disabled
pub async fn run(ledger: EngagementLedger, config: ReconcilerConfig) -> anyhow::Result<()> {
    if !config.enabled {
        tracing::info!("Counter reconciler disabled by configuration");
        return Ok(());
    }

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Starting counter reconciler"
    );

    let mut consecutive_failures = 0u32;

    loop {
        sleep(config.interval).await;

        if reconcile_once(&ledger).await {
            if consecutive_failures > 0 {
                tracing::info!(
                    previous_failures = consecutive_failures,
                    "Counter reconciliation recovered"
                );
            }
            consecutive_failures = 0;
        } else {
            consecutive_failures += 1;
            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                tracing::error!(
                    consecutive_failures,
                    pending = ledger.drift().len(),
                    "Counter reconciliation: CRITICAL - multiple consecutive failures"
                );
            } else {
                tracing::warn!(
                    consecutive_failures,
                    pending = ledger.drift().len(),
                    "Counter reconciliation: some counters still pending"
                );
            }
        }
    }
}
