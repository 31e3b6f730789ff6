// Voting client library - coordination layer over a voting contract
// This exposes the core components for testing and integration

pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod forms;
pub mod ledger;
pub mod observability;
pub mod submission;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use config::ClientConfig;
pub use contract::{
    Address, CallArg, ChangeEvent, ContractCall, EventKey, Operation, OperationRegistry, Proposal,
    TransactionHandle, Voter, WorkflowStage,
};
pub use error::{ClientError, LedgerError};
pub use events::{ChangeEventWatcher, WatchHandle};
pub use forms::{FormSession, RegisterProposalForm, RegisterVoterForm, ResultView, VoteForm};
pub use ledger::{InMemoryLedger, Ledger, LogSubscription, ReceiptStatus, WORKFLOW_STATUS_CHANGE};
pub use observability::{ledger_metrics, LedgerMetrics, OperationTimer};
pub use submission::{ConfirmationTracker, SubmissionState, TrackedOutcome, TransactionSubmitter};
pub use telemetry::{create_submission_span, generate_correlation_id, init_telemetry};
pub use workflows::{StageChange, StageEvent, StageTracker, WorkflowStatusController};

#[cfg(any(test, feature = "testing"))]
pub use ledger::MockLedger;
