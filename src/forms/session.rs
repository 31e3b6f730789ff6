use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::contract::{CallArg, Operation, TransactionHandle};
use crate::error::ClientError;
use crate::ledger::Ledger;
use crate::submission::{ConfirmationTracker, TrackedOutcome, TransactionSubmitter};

/// Submit-then-confirm plumbing shared by every form
#[derive(Debug)]
pub struct FormSession {
    submitter: TransactionSubmitter,
    tracker: ConfirmationTracker,
    error: Option<ClientError>,
}

impl FormSession {
    pub fn new(ledger: Arc<dyn Ledger>, poll_interval: Duration) -> Self {
        Self {
            submitter: TransactionSubmitter::new(Arc::clone(&ledger)),
            tracker: ConfirmationTracker::new(ledger, poll_interval),
            error: None,
        }
    }

    /// Submitting, or waiting for the last submission to confirm
    pub fn is_busy(&self) -> bool {
        self.submitter.in_flight() || self.tracker.is_pending()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn pending_handle(&self) -> Option<&TransactionHandle> {
        self.tracker.handle()
    }

    pub async fn submit(&mut self, operation: Operation, args: Vec<CallArg>) -> Result<TransactionHandle, ClientError> {
        if self.is_busy() {
            return Err(ClientError::SubmissionInProgress);
        }
        self.error = None;
        match self.submitter.submit_operation(operation, args).await {
            Ok(handle) => {
                self.tracker.arm(handle.clone());
                Ok(handle)
            }
            Err(error) => {
                self.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Wait for the pending submission to finalize. `None` if nothing is pending.
    pub async fn settle(&mut self) -> Option<TrackedOutcome> {
        let outcome = self.tracker.wait().await?;
        if let TrackedOutcome::Failed(error) = &outcome {
            self.error = Some(error.clone());
        }
        Some(outcome)
    }

    /// Store a locally detected problem as the session error
    pub(crate) fn fail(&mut self, error: ClientError) -> ClientError {
        debug!(error = %error, "Form input rejected");
        self.error = Some(error.clone());
        error
    }

    pub fn reset(&mut self) {
        self.submitter.reset();
        self.tracker.disarm();
        self.error = None;
    }
}
