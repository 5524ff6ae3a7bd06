//! Background cleanup of expired ledger entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info};

use bclip_models::{LEDGER_CLEANUP_INTERVAL, LEDGER_CLEANUP_TIMEOUT};

use crate::error::{QueueError, QueueResult};
use crate::ledger::StatusLedger;

/// Counter incremented by the number of entries each run removes.
pub const CLEANUP_REMOVED_METRIC: &str = "bclip_ledger_cleanup_removed_total";

/// Runs [`StatusLedger::cleanup`] on a fixed interval.
pub struct LedgerJanitor {
    ledger: Arc<dyn StatusLedger>,
    interval: Duration,
    run_timeout: Duration,
}

impl LedgerJanitor {
    pub fn new(ledger: Arc<dyn StatusLedger>) -> Self {
        Self {
            ledger,
            interval: LEDGER_CLEANUP_INTERVAL,
            run_timeout: LEDGER_CLEANUP_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Run a single cleanup bounded by the run timeout.
    pub async fn run_once(&self) -> QueueResult<u64> {
        let removed = timeout(self.run_timeout, self.ledger.cleanup())
            .await
            .map_err(|_| QueueError::Timeout(format!("ledger cleanup after {:?}", self.run_timeout)))??;

        metrics::counter!(CLEANUP_REMOVED_METRIC).increment(removed);
        Ok(removed)
    }

    /// Loop until `shutdown` flips to true. Errors are logged, never fatal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting ledger janitor (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(0) => debug!("Ledger cleanup found nothing to remove"),
                        Ok(removed) => info!(removed, "Ledger cleanup removed expired entries"),
                        Err(e) => error!("Ledger cleanup failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Ledger janitor stopped");
    }
}
