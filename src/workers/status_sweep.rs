//! Background sweep that verifies stale pending payments
//!
//! A callback can be lost or delayed indefinitely. This worker
//! periodically picks up payments that have sat in `pending` past a
//! grace window and runs them through the status verifier, which
//! applies any provider-side resolution through the usual guarded
//! transition.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::database::store::PaymentStore;
use crate::services::status_verifier::StatusVerifier;

#[derive(Debug, Clone)]
pub struct StatusSweepConfig {
    /// How often the worker wakes up.
    pub poll_interval: Duration,
    /// Pending payments younger than this are left alone; the callback
    /// may simply not have arrived yet.
    pub pending_grace: Duration,
    /// Pending payments older than this are no longer swept. Anything
    /// stuck past the cutoff needs manual attention rather than
    /// another provider query every cycle.
    pub pending_cutoff: Duration,
    /// Maximum number of stale payments verified per cycle.
    pub batch_size: i64,
}

impl Default for StatusSweepConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            pending_grace: Duration::from_secs(120),
            pending_cutoff: Duration::from_secs(86_400),
            batch_size: 50,
        }
    }
}

impl StatusSweepConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = Duration::from_secs(
            std::env::var("STATUS_SWEEP_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.pending_grace = Duration::from_secs(
            std::env::var("STATUS_SWEEP_PENDING_GRACE_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.pending_grace.as_secs()),
        );
        cfg.pending_cutoff = Duration::from_secs(
            std::env::var("STATUS_SWEEP_PENDING_CUTOFF_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.pending_cutoff.as_secs()),
        );
        cfg.batch_size = std::env::var("STATUS_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);
        cfg
    }
}

pub struct StatusSweepWorker {
    store: Arc<dyn PaymentStore>,
    verifier: Arc<StatusVerifier>,
    config: StatusSweepConfig,
}

impl StatusSweepWorker {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        verifier: Arc<StatusVerifier>,
        config: StatusSweepConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            pending_grace_secs = self.config.pending_grace.as_secs(),
            pending_cutoff_secs = self.config.pending_cutoff.as_secs(),
            batch_size = self.config.batch_size,
            "Status sweep worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Status sweep worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "Status sweep cycle failed");
                    }
                }
            }
        }

        info!("Status sweep worker stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let stale = self
            .store
            .find_stale_pending(
                self.config.pending_grace.as_secs() as i64,
                self.config.pending_cutoff.as_secs() as i64,
                self.config.batch_size,
            )
            .await?;

        if stale.is_empty() {
            return Ok(());
        }

        info!(count = stale.len(), "Verifying stale pending payments");

        for payment in stale {
            // One bad payment must not stop the rest of the batch
            if let Err(e) = self.verifier.verify(&payment.transaction_id).await {
                warn!(
                    transaction_id = %payment.transaction_id,
                    error = %e,
                    "Stale payment verification failed"
                );
            }
        }

        Ok(())
    }
}
