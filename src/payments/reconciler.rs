//! Periodic reconciliation sweep
//!
//! Initiated transactions whose gateway response was lost stay indeterminate
//! until something re-verifies them. This background task picks up stale
//! `initiated` records and pushes each through the engine's reconcile path.
//! It is a collaborator of the state machine, not part of it.

use crate::database::transaction::TransactionStore;
use crate::payments::engine::PaymentEngine;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    /// Seconds between sweep passes.
    pub interval_secs: u64,
    /// An initiated transaction untouched for this long is considered stale.
    pub stale_after_secs: i64,
    /// Upper bound on transactions re-verified per pass.
    pub batch_limit: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            stale_after_secs: 900,
            batch_limit: 50,
        }
    }
}

/// Spawn the sweep loop. Individual failures are logged and skipped; the
/// loop itself never exits on error.
pub fn spawn(
    engine: Arc<PaymentEngine>,
    store: Arc<dyn TransactionStore>,
    config: ReconcilerConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_sweep(&engine, store.as_ref(), &config).await;
        }
    })
}

/// One sweep pass, separated out so tests can drive it directly.
pub async fn run_sweep(
    engine: &PaymentEngine,
    store: &dyn TransactionStore,
    config: &ReconcilerConfig,
) {
    let cutoff = Utc::now() - ChronoDuration::seconds(config.stale_after_secs);
    let stale = match store.find_stale_initiated(cutoff, config.batch_limit).await {
        Ok(stale) => stale,
        Err(e) => {
            warn!("reconciliation sweep could not list stale transactions: {e}");
            return;
        }
    };

    if stale.is_empty() {
        debug!("reconciliation sweep found nothing stale");
        return;
    }

    info!(count = stale.len(), "re-verifying stale initiated transactions");
    for tx in stale {
        match engine.reconcile(&tx.client_reference).await {
            Ok(outcome) => {
                info!(
                    client_reference = %outcome.client_reference,
                    status = %outcome.status,
                    "sweep reconciled transaction"
                );
            }
            Err(e) => {
                warn!(
                    client_reference = %tx.client_reference,
                    "sweep could not reconcile transaction: {e}"
                );
            }
        }
    }
}
