// In-process ledger for the simulation command and integration tests.
// Accepted writes take effect immediately; receipts stay pending for a
// configurable number of polls, which mimics block inclusion.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Ledger, LedgerError, LogSubscription, ReceiptStatus, WORKFLOW_STATUS_CHANGE};
use crate::contract::{
    Address, CallArg, ChangeEvent, ContractCall, Operation, OperationRegistry, Proposal,
    TransactionHandle, Voter, WorkflowStage,
};

const SUBSCRIPTION_CAPACITY: usize = 64;

#[derive(Debug)]
struct TxRecord {
    status: ReceiptStatus,
    polls_until_final: u32,
}

#[derive(Debug)]
struct ContractState {
    owner: Address,
    stage: WorkflowStage,
    voters: HashMap<Address, Voter>,
    proposals: Vec<Proposal>,
    proposal_log: Vec<u64>,
    winning_proposal_id: u64,
    tx_counter: u64,
    transactions: HashMap<TransactionHandle, TxRecord>,
    confirmation_polls: u32,
    subscribers: Vec<mpsc::Sender<Vec<ChangeEvent>>>,
    redeliver_events: bool,
    reject_next: Option<String>,
    revert_next: Option<String>,
    submission_count: u64,
}

impl ContractState {
    fn new(owner: Address) -> Self {
        Self {
            owner,
            stage: WorkflowStage::INITIAL,
            voters: HashMap::new(),
            proposals: Vec::new(),
            proposal_log: Vec::new(),
            winning_proposal_id: 0,
            tx_counter: 0,
            transactions: HashMap::new(),
            confirmation_polls: 1,
            subscribers: Vec::new(),
            redeliver_events: false,
            reject_next: None,
            revert_next: None,
            submission_count: 0,
        }
    }

    fn require_owner(&self, sender: &Address) -> Result<(), LedgerError> {
        if *sender != self.owner {
            return Err(LedgerError::new("Ownable: caller is not the owner"));
        }
        Ok(())
    }

    fn require_voter(&self, sender: &Address) -> Result<(), LedgerError> {
        match self.voters.get(sender) {
            Some(voter) if voter.is_registered => Ok(()),
            _ => Err(LedgerError::new("You're not a voter")),
        }
    }

    fn require_stage(&self, expected: WorkflowStage, message: &str) -> Result<(), LedgerError> {
        if self.stage != expected {
            return Err(LedgerError::new(message));
        }
        Ok(())
    }

    /// Runs the call against contract rules. Returns the logs it emits.
    fn execute(&mut self, sender: &Address, call: &ContractCall) -> Result<Vec<WorkflowStage>, LedgerError> {
        match call.operation {
            Operation::AddVoter => {
                self.require_owner(sender)?;
                self.require_stage(WorkflowStage::RegisteringVoters, "Voters registration is not open yet")?;
                let address = expect_arg(call, 0, CallArg::as_address)?.clone();
                let entry = self.voters.entry(address).or_default();
                if entry.is_registered {
                    return Err(LedgerError::new("Already registered"));
                }
                entry.is_registered = true;
                Ok(Vec::new())
            }
            Operation::AddProposal => {
                self.require_voter(sender)?;
                self.require_stage(
                    WorkflowStage::ProposalsRegistrationStarted,
                    "Proposals are not allowed yet",
                )?;
                let description = expect_arg(call, 0, CallArg::as_text)?;
                if description.trim().is_empty() {
                    return Err(LedgerError::new("Empty proposal"));
                }
                self.push_proposal(description.to_string());
                Ok(Vec::new())
            }
            Operation::SetVote => {
                self.require_voter(sender)?;
                self.require_stage(WorkflowStage::VotingSessionStarted, "Voting session havent started yet")?;
                let id = expect_arg(call, 0, CallArg::as_uint)?;
                if self.voters.get(sender).is_some_and(|v| v.has_voted) {
                    return Err(LedgerError::new("You have already voted"));
                }
                let proposal = self
                    .proposals
                    .get_mut(id as usize)
                    .ok_or_else(|| LedgerError::new("Proposal not found"))?;
                proposal.vote_count += 1;
                if let Some(voter) = self.voters.get_mut(sender) {
                    voter.has_voted = true;
                    voter.voted_proposal_id = id;
                }
                Ok(Vec::new())
            }
            Operation::GetVoter | Operation::GetOneProposal => {
                self.require_voter(sender)?;
                Ok(Vec::new())
            }
            advancing => {
                self.require_owner(sender)?;
                let registry = OperationRegistry::new();
                let expected = registry.operation_for_stage(self.stage.index());
                if expected != Some(advancing) {
                    return Err(LedgerError::new(format!(
                        "{} is not allowed while status is {}",
                        advancing, self.stage
                    )));
                }
                let previous = self.stage;
                let next = registry
                    .stage_reached_by(advancing)
                    .ok_or_else(|| LedgerError::new("Unknown workflow transition"))?;
                if advancing == Operation::StartProposalsRegistering {
                    self.push_proposal("GENESIS".to_string());
                }
                if advancing == Operation::TallyVotes {
                    self.winning_proposal_id = self
                        .proposals
                        .iter()
                        .fold(None::<&Proposal>, |best, p| match best {
                            Some(b) if b.vote_count >= p.vote_count => Some(b),
                            _ => Some(p),
                        })
                        .map(|p| p.id)
                        .unwrap_or(0);
                }
                self.stage = next;
                Ok(vec![previous, next])
            }
        }
    }

    /// Runs the call on a scratch copy of the contract data
    fn dry_run(&self, sender: &Address, call: &ContractCall) -> Result<(), LedgerError> {
        let mut scratch = ContractState {
            stage: self.stage,
            voters: self.voters.clone(),
            proposals: self.proposals.clone(),
            proposal_log: self.proposal_log.clone(),
            winning_proposal_id: self.winning_proposal_id,
            ..ContractState::new(self.owner.clone())
        };
        scratch.execute(sender, call).map(|_| ())
    }

    fn push_proposal(&mut self, description: String) {
        let id = self.proposals.len() as u64;
        self.proposals.push(Proposal {
            id,
            description,
            vote_count: 0,
        });
        self.proposal_log.push(id);
    }

    fn deliver(&mut self, batch: Vec<ChangeEvent>) {
        self.subscribers.retain(|sender| !sender.is_closed());
        let copies = if self.redeliver_events { 2 } else { 1 };
        for sender in &self.subscribers {
            for _ in 0..copies {
                if sender.try_send(batch.clone()).is_err() {
                    debug!("Subscriber lagging, batch dropped");
                }
            }
        }
    }
}

fn expect_arg<'a, R>(
    call: &'a ContractCall,
    position: usize,
    extract: impl Fn(&'a CallArg) -> Option<R>,
) -> Result<R, LedgerError> {
    call.args
        .get(position)
        .and_then(extract)
        .ok_or_else(|| LedgerError::new(format!("{}: bad argument at position {position}", call.operation)))
}

/// A connection to a simulated voting contract, bound to one account.
/// Clones made with [`InMemoryLedger::connect`] share the contract state.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<ContractState>>,
    account: Address,
}

impl InMemoryLedger {
    /// Deploy a fresh contract owned by `owner` and connect as the owner
    pub fn deploy(owner: Address) -> Self {
        info!(owner = %owner, "Deploying in-memory voting contract");
        Self {
            state: Arc::new(Mutex::new(ContractState::new(owner.clone()))),
            account: owner,
        }
    }

    /// Another connection to the same contract, sending from `account`
    pub fn connect(&self, account: Address) -> Self {
        Self {
            state: Arc::clone(&self.state),
            account,
        }
    }

    fn state(&self) -> MutexGuard<'_, ContractState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receipt polls a transaction stays pending before it is final
    pub fn set_confirmation_polls(&self, polls: u32) {
        self.state().confirmation_polls = polls;
    }

    /// Deliver every event batch twice, as a reconnecting transport would
    pub fn set_redeliver_events(&self, redeliver: bool) {
        self.state().redeliver_events = redeliver;
    }

    /// The next submission is refused with `message`
    pub fn reject_next_submission(&self, message: impl Into<String>) {
        self.state().reject_next = Some(message.into());
    }

    /// The next accepted submission reverts with `reason` on finalization
    pub fn revert_next_submission(&self, reason: impl Into<String>) {
        self.state().revert_next = Some(reason.into());
    }

    /// Push a raw batch to every subscriber
    pub fn inject_batch(&self, batch: Vec<ChangeEvent>) {
        self.state().deliver(batch);
    }

    /// Finalize every pending transaction
    pub fn mine_all(&self) {
        for record in self.state().transactions.values_mut() {
            record.polls_until_final = 0;
        }
    }

    /// Number of submit calls that reached the ledger
    pub fn submission_count(&self) -> u64 {
        self.state().submission_count
    }

    /// Force the stage, as another client would by advancing it first
    pub fn force_stage(&self, stage: WorkflowStage) {
        self.state().stage = stage;
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn account(&self) -> Address {
        self.account.clone()
    }

    async fn workflow_stage(&self) -> Result<WorkflowStage, LedgerError> {
        Ok(self.state().stage)
    }

    async fn owner(&self) -> Result<Address, LedgerError> {
        Ok(self.state().owner.clone())
    }

    async fn submit(&self, call: &ContractCall) -> Result<TransactionHandle, LedgerError> {
        let mut state = self.state();
        state.submission_count += 1;

        if let Some(message) = state.reject_next.take() {
            return Err(LedgerError::new(message));
        }

        state.tx_counter += 1;
        let handle = TransactionHandle::new(format!("0x{:064x}", state.tx_counter));
        let polls_until_final = state.confirmation_polls;

        if let Some(reason) = state.revert_next.take() {
            state.transactions.insert(
                handle.clone(),
                TxRecord {
                    status: ReceiptStatus::Reverted { reason },
                    polls_until_final,
                },
            );
            return Ok(handle);
        }

        let transition = state.execute(&self.account, call)?;
        state.transactions.insert(
            handle.clone(),
            TxRecord {
                status: ReceiptStatus::Confirmed,
                polls_until_final,
            },
        );

        if let [previous, next] = transition[..] {
            let event = ChangeEvent {
                transaction_id: handle.to_string(),
                log_index: 0,
                previous_stage: previous,
                new_stage: next,
            };
            state.deliver(vec![event]);
        }

        debug!(operation = %call.operation, handle = %handle, "Submission accepted");
        Ok(handle)
    }

    async fn simulate(&self, call: &ContractCall) -> Result<(), LedgerError> {
        self.state().dry_run(&self.account, call)
    }

    async fn receipt(&self, handle: &TransactionHandle) -> Result<ReceiptStatus, LedgerError> {
        let mut state = self.state();
        let record = state
            .transactions
            .get_mut(handle)
            .ok_or_else(|| LedgerError::new(format!("Unknown transaction {handle}")))?;
        if record.polls_until_final > 0 {
            record.polls_until_final -= 1;
            return Ok(ReceiptStatus::Pending);
        }
        Ok(record.status.clone())
    }

    async fn subscribe_events(&self, event_name: &str) -> Result<LogSubscription, LedgerError> {
        if event_name != WORKFLOW_STATUS_CHANGE {
            return Err(LedgerError::new(format!("Unknown event {event_name}")));
        }
        let (sender, subscription) = LogSubscription::channel(SUBSCRIPTION_CAPACITY);
        self.state().subscribers.push(sender);
        Ok(subscription)
    }

    async fn voter(&self, address: &Address) -> Result<Voter, LedgerError> {
        let state = self.state();
        state.require_voter(&self.account)?;
        Ok(state.voters.get(address).cloned().unwrap_or_default())
    }

    async fn proposal(&self, id: u64) -> Result<Proposal, LedgerError> {
        let state = self.state();
        state.require_voter(&self.account)?;
        state
            .proposals
            .get(id as usize)
            .cloned()
            .ok_or_else(|| LedgerError::new("Proposal not found"))
    }

    async fn winning_proposal_id(&self) -> Result<u64, LedgerError> {
        Ok(self.state().winning_proposal_id)
    }

    async fn proposal_ids(&self) -> Result<Vec<u64>, LedgerError> {
        Ok(self.state().proposal_log.clone())
    }
}
