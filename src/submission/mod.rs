//! Sending writes to the ledger and following them to finalization

pub mod confirmation;
pub mod submitter;

pub use confirmation::{ConfirmationTracker, TrackedOutcome};
pub use submitter::{SubmissionState, TransactionSubmitter};
