use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::contract::TransactionHandle;
use crate::error::{ClientError, LedgerError};
use crate::ledger::{Ledger, ReceiptStatus};
use crate::observability::ledger_metrics;

/// How a watched submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedOutcome {
    Confirmed(TransactionHandle),
    Failed(ClientError),
}

/// Watches one submitted transaction until the ledger finalizes it.
///
/// A handle resolves at most once: after [`ConfirmationTracker::wait`]
/// reports it, arming the same handle again is ignored.
pub struct ConfirmationTracker {
    ledger: Arc<dyn Ledger>,
    poll_interval: Duration,
    watched: Option<TransactionHandle>,
    last_resolved: Option<TransactionHandle>,
}

impl std::fmt::Debug for ConfirmationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationTracker")
            .field("poll_interval", &self.poll_interval)
            .field("watched", &self.watched)
            .finish()
    }
}

impl ConfirmationTracker {
    pub fn new(ledger: Arc<dyn Ledger>, poll_interval: Duration) -> Self {
        Self {
            ledger,
            poll_interval,
            watched: None,
            last_resolved: None,
        }
    }

    /// Start watching `handle`. Returns false if it already resolved.
    pub fn arm(&mut self, handle: TransactionHandle) -> bool {
        if self.last_resolved.as_ref() == Some(&handle) {
            debug!(handle = %handle, "Handle already resolved, not re-arming");
            return false;
        }
        self.watched = Some(handle);
        true
    }

    pub fn disarm(&mut self) {
        self.watched = None;
    }

    pub fn is_pending(&self) -> bool {
        self.watched.is_some()
    }

    pub fn handle(&self) -> Option<&TransactionHandle> {
        self.watched.as_ref()
    }

    /// Poll the ledger until the armed handle is finalized. Returns `None`
    /// when nothing is armed. Query errors are logged and retried on the
    /// next tick.
    pub async fn wait(&mut self) -> Option<TrackedOutcome> {
        let handle = self.watched.clone()?;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let status = match self.ledger.receipt(&handle).await {
                Ok(status) => status,
                Err(error) => {
                    warn!(handle = %handle, error = %error, "Receipt query failed, retrying");
                    continue;
                }
            };

            let outcome = match status {
                ReceiptStatus::Pending => continue,
                ReceiptStatus::Confirmed => {
                    ledger_metrics().record_confirmation();
                    info!(handle = %handle, "Transaction confirmed");
                    TrackedOutcome::Confirmed(handle.clone())
                }
                ReceiptStatus::Reverted { reason } => {
                    ledger_metrics().record_confirmation_failure();
                    let message = LedgerError::new(reason).message;
                    warn!(handle = %handle, reason = %message, "Transaction reverted");
                    TrackedOutcome::Failed(ClientError::ConfirmationFailed {
                        handle: handle.clone(),
                        message,
                    })
                }
            };

            self.watched = None;
            self.last_resolved = Some(handle);
            return Some(outcome);
        }
    }
}
