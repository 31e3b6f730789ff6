//! Single-flight transaction submission
//!
//! A [`TransactionSubmitter`] sends at most one operation to the ledger at a
//! time. A second request while one is in flight is answered with
//! [`ClientError::SubmissionInProgress`] and never reaches the ledger. Every
//! exit path, including a dropped future, leaves the submitter ready for a
//! retry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn, Instrument};

use crate::contract::{CallArg, ContractCall, Operation, TransactionHandle};
use crate::error::ClientError;
use crate::ledger::Ledger;
use crate::observability::ledger_metrics;
use crate::telemetry::{create_submission_span, generate_correlation_id};

/// Snapshot of a submitter's tracking state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionState {
    pub in_flight: bool,
    pub last_handle: Option<TransactionHandle>,
    pub last_error: Option<ClientError>,
}

#[derive(Debug, Default)]
struct Tracking {
    state: SubmissionState,
    // Bumped by reset so a call abandoned mid-flight cannot write back
    generation: u64,
}

/// Clears `in_flight` when the ledger call finishes or is dropped
struct InFlightGuard<'a> {
    tracking: &'a Mutex<Tracking>,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut tracking = self.tracking.lock().unwrap_or_else(PoisonError::into_inner);
        if tracking.generation == self.generation {
            tracking.state.in_flight = false;
        }
    }
}

pub struct TransactionSubmitter {
    ledger: Arc<dyn Ledger>,
    tracking: Mutex<Tracking>,
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("state", &self.state())
            .finish()
    }
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            tracking: Mutex::new(Tracking::default()),
        }
    }

    fn tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SubmissionState {
        self.tracking().state.clone()
    }

    pub fn in_flight(&self) -> bool {
        self.tracking().state.in_flight
    }

    pub fn last_handle(&self) -> Option<TransactionHandle> {
        self.tracking().state.last_handle.clone()
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.tracking().state.last_error.clone()
    }

    /// Submit the contract function called `name`. Unknown names fail with
    /// [`ClientError::InvalidOperation`] without contacting the ledger.
    pub async fn submit(&self, name: &str, args: Vec<CallArg>) -> Result<TransactionHandle, ClientError> {
        let (operation, generation) = self.begin(|| name.parse::<Operation>())?;
        self.send(operation, args, generation).await
    }

    pub async fn submit_operation(
        &self,
        operation: Operation,
        args: Vec<CallArg>,
    ) -> Result<TransactionHandle, ClientError> {
        let (operation, generation) = self.begin(|| Ok(operation))?;
        self.send(operation, args, generation).await
    }

    /// Record a failure observed after submission, e.g. a reverted receipt
    pub fn record_error(&self, error: ClientError) {
        self.tracking().state.last_error = Some(error);
    }

    /// Forget the current attempt. Does not retract anything the ledger
    /// already accepted.
    pub fn reset(&self) {
        let mut tracking = self.tracking();
        tracking.generation += 1;
        tracking.state = SubmissionState::default();
        debug!("Submission state reset");
    }

    // Check-and-set happens under one lock so two callers cannot both pass.
    fn begin(
        &self,
        resolve: impl FnOnce() -> Result<Operation, ClientError>,
    ) -> Result<(Operation, u64), ClientError> {
        let mut tracking = self.tracking();
        if tracking.state.in_flight {
            debug!("Submission already in flight, request ignored");
            return Err(ClientError::SubmissionInProgress);
        }

        let operation = match resolve() {
            Ok(operation) => operation,
            Err(error) => {
                ledger_metrics().record_invalid_operation();
                warn!(error = %error, "Refusing to submit unknown operation");
                tracking.state.last_error = Some(error.clone());
                return Err(error);
            }
        };

        tracking.state.in_flight = true;
        tracking.state.last_error = None;
        Ok((operation, tracking.generation))
    }

    async fn send(
        &self,
        operation: Operation,
        args: Vec<CallArg>,
        generation: u64,
    ) -> Result<TransactionHandle, ClientError> {
        let _guard = InFlightGuard {
            tracking: &self.tracking,
            generation,
        };
        let call = ContractCall::new(operation, args);
        let correlation_id = generate_correlation_id();
        let span = create_submission_span(operation.name(), &correlation_id);

        ledger_metrics().record_submission();
        let result = self.ledger.submit(&call).instrument(span).await;

        let mut tracking = self.tracking();
        let current = tracking.generation == generation;
        match result {
            Ok(handle) => {
                info!(operation = %operation, handle = %handle, "Submission accepted by ledger");
                if current {
                    tracking.state.last_handle = Some(handle.clone());
                }
                Ok(handle)
            }
            Err(ledger_error) => {
                ledger_metrics().record_rejection();
                warn!(operation = %operation, error = %ledger_error, "Submission rejected by ledger");
                let error = ClientError::SubmissionRejected {
                    message: ledger_error.message,
                };
                if current {
                    tracking.state.last_error = Some(error.clone());
                }
                Err(error)
            }
        }
    }
}
