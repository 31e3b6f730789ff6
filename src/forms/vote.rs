use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::FormSession;
use crate::contract::{CallArg, ContractCall, Operation, Proposal, TransactionHandle};
use crate::error::ClientError;
use crate::ledger::Ledger;
use crate::submission::TrackedOutcome;

/// Ballot: lists registered proposals and casts one vote
pub struct VoteForm {
    ledger: Arc<dyn Ledger>,
    session: FormSession,
    proposals: Vec<Proposal>,
    voting_for: Option<u64>,
}

impl std::fmt::Debug for VoteForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteForm")
            .field("session", &self.session)
            .field("proposals", &self.proposals.len())
            .field("voting_for", &self.voting_for)
            .finish()
    }
}

impl VoteForm {
    pub fn new(ledger: Arc<dyn Ledger>, poll_interval: Duration) -> Self {
        Self {
            session: FormSession::new(Arc::clone(&ledger), poll_interval),
            ledger,
            proposals: Vec::new(),
            voting_for: None,
        }
    }

    /// Fetch every proposal announced by a registration log
    pub async fn load_proposals(&mut self) -> Result<&[Proposal], ClientError> {
        let ids = self.ledger.proposal_ids().await?;
        let mut proposals = Vec::with_capacity(ids.len());
        for id in ids {
            proposals.push(self.ledger.proposal(id).await?);
        }
        debug!(count = proposals.len(), "Proposals loaded");
        self.proposals = proposals;
        Ok(&self.proposals)
    }

    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Proposal whose vote is being submitted or confirmed
    pub fn voting_for(&self) -> Option<u64> {
        self.voting_for
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    /// Dry-run the vote, then submit it. A vote the contract would revert
    /// is reported without sending anything.
    pub async fn vote(&mut self, proposal_id: u64) -> Result<TransactionHandle, ClientError> {
        if self.session.is_busy() {
            return Err(ClientError::SubmissionInProgress);
        }
        let args = vec![CallArg::Uint(proposal_id)];
        let call = ContractCall::new(Operation::SetVote, args.clone());
        if let Err(error) = self.ledger.simulate(&call).await {
            debug!(proposal_id, reason = %error.message, "Vote would revert");
            return Err(self.session.fail(ClientError::SubmissionRejected { message: error.message }));
        }

        self.voting_for = Some(proposal_id);
        let result = self.session.submit(Operation::SetVote, args).await;
        if result.is_err() {
            self.voting_for = None;
        }
        result
    }

    pub async fn settle(&mut self) -> Option<TrackedOutcome> {
        let outcome = self.session.settle().await?;
        self.voting_for = None;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, MockLedger, ReceiptStatus};

    fn proposal(id: u64, description: &str) -> Proposal {
        Proposal {
            id,
            description: description.to_string(),
            vote_count: id,
        }
    }

    #[tokio::test]
    async fn test_load_proposals_follows_registration_log() {
        let mut mock = MockLedger::new();
        mock.expect_proposal_ids().returning(|| Ok(vec![0, 1, 2]));
        mock.expect_proposal().returning(|id| Ok(proposal(id, &format!("p{id}"))));
        let mut form = VoteForm::new(Arc::new(mock), Duration::from_millis(1));

        let loaded = form.load_proposals().await.unwrap();

        let descriptions: Vec<_> = loaded.iter().map(|p| p.description.as_str()).collect();
        assert_eq!(descriptions, ["p0", "p1", "p2"]);
    }

    #[tokio::test]
    async fn test_vote_tracks_target_until_settled() {
        let mut mock = MockLedger::new();
        mock.expect_simulate().times(1).returning(|_| Ok(()));
        mock.expect_submit().times(1).returning(|call| {
            assert_eq!(call.args, vec![CallArg::Uint(2)]);
            Ok(TransactionHandle::new("0x02"))
        });
        mock.expect_receipt().returning(|_| Ok(ReceiptStatus::Confirmed));
        let mut form = VoteForm::new(Arc::new(mock), Duration::from_millis(1));

        form.vote(2).await.unwrap();
        assert_eq!(form.voting_for(), Some(2));
        assert_eq!(form.vote(1).await, Err(ClientError::SubmissionInProgress));

        assert!(matches!(form.settle().await, Some(TrackedOutcome::Confirmed(_))));
        assert_eq!(form.voting_for(), None);
    }

    #[tokio::test]
    async fn test_rejected_vote_uses_short_message() {
        let mut mock = MockLedger::new();
        mock.expect_simulate().returning(|_| Ok(()));
        mock.expect_submit().returning(|_| {
            Err(LedgerError::from_parts(
                Some("You have already voted"),
                Some("execution reverted: You have already voted"),
                Some("raw details"),
            ))
        });
        let mut form = VoteForm::new(Arc::new(mock), Duration::from_millis(1));

        let err = form.vote(1).await.unwrap_err();

        assert_eq!(err.user_message(), "You have already voted");
        assert_eq!(form.voting_for(), None);
    }

    #[tokio::test]
    async fn test_vote_that_would_revert_is_never_sent() {
        let mut mock = MockLedger::new();
        mock.expect_simulate().times(1).returning(|call| {
            assert_eq!(call.operation, Operation::SetVote);
            Err(LedgerError::new("Proposal not found"))
        });
        mock.expect_submit().never();
        let mut form = VoteForm::new(Arc::new(mock), Duration::from_millis(1));

        let err = form.vote(9).await.unwrap_err();

        assert_eq!(err.user_message(), "Proposal not found");
        assert_eq!(form.session().error(), Some(&err));
        assert_eq!(form.voting_for(), None);
        assert!(!form.session().is_busy());
    }
}
