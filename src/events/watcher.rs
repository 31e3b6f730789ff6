use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::contract::{ChangeEvent, EventKey};
use crate::error::ClientError;
use crate::ledger::Ledger;
use crate::observability::ledger_metrics;

#[derive(Debug, Default)]
struct WatcherState {
    seen: HashSet<EventKey>,
    latest: Option<ChangeEvent>,
}

/// Turns raw log batches into at most one notification per distinct log.
///
/// Only the first entry of a batch is considered; its
/// `(transaction_id, log_index)` pair decides whether the batch is new.
#[derive(Debug, Clone, Default)]
pub struct ChangeEventWatcher {
    state: Arc<Mutex<WatcherState>>,
}

impl ChangeEventWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a delivered batch. Returns the event to notify about, or
    /// `None` for an empty batch or one already seen.
    pub fn accept_batch(&self, batch: &[ChangeEvent]) -> Option<ChangeEvent> {
        let first = batch.first()?;
        let mut state = self.state();
        if !state.seen.insert(first.key()) {
            ledger_metrics().record_duplicate_event();
            debug!(
                transaction_id = %first.transaction_id,
                log_index = first.log_index,
                "Duplicate change event ignored"
            );
            return None;
        }
        state.latest = Some(first.clone());
        Some(first.clone())
    }

    pub fn latest(&self) -> Option<ChangeEvent> {
        self.state().latest.clone()
    }

    /// Drop the latest event without forgetting it was seen
    pub fn clear_latest(&self) {
        self.state().latest = None;
    }

    /// Forget every seen key
    pub fn reset(&self) {
        let mut state = self.state();
        state.seen.clear();
        state.latest = None;
    }

    pub fn seen_count(&self) -> usize {
        self.state().seen.len()
    }

    pub fn has_seen(&self, key: &EventKey) -> bool {
        self.state().seen.contains(key)
    }

    /// Subscribe to `event_name` on `ledger` and call `on_event` once per
    /// distinct change. The subscription lives as long as the returned handle.
    pub async fn subscribe<F>(
        &self,
        ledger: &dyn Ledger,
        event_name: &str,
        on_event: F,
    ) -> Result<WatchHandle, ClientError>
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        let mut subscription = ledger.subscribe_events(event_name).await?;
        info!(event = event_name, "Subscribed to ledger events");

        let watcher = self.clone();
        let task = tokio::spawn(async move {
            while let Some(batch) = subscription.next_batch().await {
                if let Some(event) = watcher.accept_batch(&batch) {
                    on_event(event);
                }
            }
            debug!("Ledger closed the event subscription");
        });

        Ok(WatchHandle { task })
    }
}

/// Keeps a subscription alive. Dropping it stops delivery.
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
