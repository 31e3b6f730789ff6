use std::sync::Arc;
use std::time::Duration;

use super::FormSession;
use crate::contract::{CallArg, Operation, TransactionHandle};
use crate::error::ClientError;
use crate::ledger::Ledger;
use crate::submission::TrackedOutcome;

/// Voter form for submitting a proposal description
#[derive(Debug)]
pub struct RegisterProposalForm {
    session: FormSession,
    description: String,
}

impl RegisterProposalForm {
    pub fn new(ledger: Arc<dyn Ledger>, poll_interval: Duration) -> Self {
        Self {
            session: FormSession::new(ledger, poll_interval),
            description: String::new(),
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    pub async fn submit(&mut self) -> Result<TransactionHandle, ClientError> {
        if self.description.trim().is_empty() {
            return Err(self.session.fail(ClientError::InvalidArgument {
                reason: "proposal description is empty".to_string(),
            }));
        }
        let args = vec![CallArg::Text(self.description.clone())];
        self.session.submit(Operation::AddProposal, args).await
    }

    pub async fn settle(&mut self) -> Option<TrackedOutcome> {
        let outcome = self.session.settle().await?;
        if matches!(outcome, TrackedOutcome::Confirmed(_)) {
            self.description.clear();
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Address, ContractCall};
    use crate::ledger::{InMemoryLedger, Ledger};

    fn owner() -> Address {
        Address::parse("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap()
    }

    fn voter() -> Address {
        Address::parse("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap()
    }

    #[tokio::test]
    async fn test_blank_description_never_submits() {
        let ledger = InMemoryLedger::deploy(owner());
        let mut form = RegisterProposalForm::new(Arc::new(ledger.clone()), Duration::from_millis(1));

        form.set_description("   ");
        assert!(matches!(form.submit().await, Err(ClientError::InvalidArgument { .. })));
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_registered_voter_adds_proposal() {
        let ledger = InMemoryLedger::deploy(owner());
        ledger
            .submit(&ContractCall::new(Operation::AddVoter, vec![CallArg::Address(voter())]))
            .await
            .unwrap();
        ledger
            .submit(&ContractCall::new(Operation::StartProposalsRegistering, Vec::new()))
            .await
            .unwrap();
        let alice = ledger.connect(voter());
        let mut form = RegisterProposalForm::new(Arc::new(alice.clone()), Duration::from_millis(1));

        form.set_description("Build a bike lane");
        form.submit().await.unwrap();
        assert!(matches!(form.settle().await, Some(TrackedOutcome::Confirmed(_))));

        assert_eq!(form.description(), "");
        assert_eq!(alice.proposal_ids().await.unwrap(), vec![0, 1]);
        assert_eq!(alice.proposal(1).await.unwrap().description, "Build a bike lane");
    }

    #[tokio::test]
    async fn test_ledger_refusal_is_surfaced() {
        let ledger = InMemoryLedger::deploy(owner());
        let mut form = RegisterProposalForm::new(Arc::new(ledger.connect(voter())), Duration::from_millis(1));

        form.set_description("Too early");
        let err = form.submit().await.unwrap_err();

        assert_eq!(err.user_message(), "You're not a voter");
        assert_eq!(form.session().error(), Some(&err));
        assert_eq!(form.description(), "Too early");
    }
}
