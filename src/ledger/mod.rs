//! Ledger abstraction
//!
//! The ledger is the system of record for voters, proposals, votes and the
//! workflow stage. Everything in this crate reaches it through the [`Ledger`]
//! trait, so tests can inject a mock and the CLI can inject the in-process
//! [`memory::InMemoryLedger`].
//!
//! A `Ledger` value is bound to one account: writes are sent from that
//! account and reads that depend on the caller are evaluated for it.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::contract::{Address, ChangeEvent, ContractCall, Proposal, TransactionHandle, Voter, WorkflowStage};
pub use crate::error::LedgerError;

pub use memory::InMemoryLedger;

/// Name of the log emitted on every workflow transition
pub const WORKFLOW_STATUS_CHANGE: &str = "WorkflowStatusChange";

/// State of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Reverted { reason: String },
}

/// Live feed of log batches for one event name. Dropping it unsubscribes.
#[derive(Debug)]
pub struct LogSubscription {
    receiver: mpsc::Receiver<Vec<ChangeEvent>>,
}

impl LogSubscription {
    pub fn new(receiver: mpsc::Receiver<Vec<ChangeEvent>>) -> Self {
        Self { receiver }
    }

    /// Sender/subscription pair, used by ledger implementations and tests
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<ChangeEvent>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self::new(receiver))
    }

    /// Next delivered batch, `None` once the ledger side closes
    pub async fn next_batch(&mut self) -> Option<Vec<ChangeEvent>> {
        self.receiver.recv().await
    }
}

/// Operations the voting contract exposes to this client
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Account this connection sends from
    fn account(&self) -> Address;

    /// `workflowStatus`
    async fn workflow_stage(&self) -> Result<WorkflowStage, LedgerError>;

    /// `owner`
    async fn owner(&self) -> Result<Address, LedgerError>;

    /// Send a write. Resolves once the ledger accepts or rejects the
    /// submission, not when it is finalized.
    async fn submit(&self, call: &ContractCall) -> Result<TransactionHandle, LedgerError>;

    /// Dry-run a write against current state without sending it. Fails
    /// with the revert reason the real submission would hit.
    async fn simulate(&self, call: &ContractCall) -> Result<(), LedgerError>;

    /// Finalization status of an accepted submission
    async fn receipt(&self, handle: &TransactionHandle) -> Result<ReceiptStatus, LedgerError>;

    /// Subscribe to logs with the given event name
    async fn subscribe_events(&self, event_name: &str) -> Result<LogSubscription, LedgerError>;

    /// `getVoter`
    async fn voter(&self, address: &Address) -> Result<Voter, LedgerError>;

    /// `getOneProposal`
    async fn proposal(&self, id: u64) -> Result<Proposal, LedgerError>;

    /// `winningProposalID`
    async fn winning_proposal_id(&self) -> Result<u64, LedgerError>;

    /// Ids carried by every `ProposalRegistered` log since genesis
    async fn proposal_ids(&self) -> Result<Vec<u64>, LedgerError>;
}
