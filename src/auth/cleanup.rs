//! Periodic sweep of expired revocation and ephemeral records.

use super::revocation::RevocationLedger;
use crate::domain::{EphemeralStorePtr, MetricsPtr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What one sweep removed. A failed step contributes zero and is retried next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub refresh_tokens: u64,
    pub blacklist_entries: u64,
    pub ephemeral_entries: u64,
    pub failures: u32,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.refresh_tokens + self.blacklist_entries + self.ephemeral_entries
    }
}

pub struct CleanupScheduler {
    // ---
    ledger: Arc<RevocationLedger>,
    store: EphemeralStorePtr,
    metrics: MetricsPtr,
    interval: Duration,
}

impl CleanupScheduler {
    // ---
    pub fn new(
        ledger: Arc<RevocationLedger>,
        store: EphemeralStorePtr,
        metrics: MetricsPtr,
        interval: Duration,
    ) -> Self {
        // ---
        Self {
            ledger,
            store,
            metrics,
            interval,
        }
    }

    /// One sweep. Never fails; problems are logged and counted.
    pub async fn run_once(&self) -> CleanupReport {
        // ---
        let mut report = CleanupReport::default();

        match self.ledger.cleanup_expired().await {
            Ok(removed) => {
                report.refresh_tokens = removed.refresh_tokens;
                report.blacklist_entries = removed.blacklist_entries;
            }
            Err(err) => {
                tracing::error!("Revocation cleanup failed: {}", err);
                report.failures += 1;
            }
        }

        match self.store.purge_expired().await {
            Ok(removed) => report.ephemeral_entries = removed,
            Err(err) => {
                tracing::error!("Ephemeral store cleanup failed: {}", err);
                report.failures += 1;
            }
        }

        self.metrics.record_cleanup(report.total());
        tracing::info!(
            "Cleanup removed {} refresh token(s), {} blacklist entr(ies), {} ephemeral record(s)",
            report.refresh_tokens,
            report.blacklist_entries,
            report.ephemeral_entries
        );

        report
    }

    /// Run immediately, then once per interval, until the handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        // ---
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
