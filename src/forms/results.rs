use std::sync::Arc;

use crate::contract::{Proposal, WorkflowStage};
use crate::error::ClientError;
use crate::ledger::Ledger;

/// Read-only view of the tallied outcome
#[derive(Clone)]
pub struct ResultView {
    ledger: Arc<dyn Ledger>,
}

impl ResultView {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// The winning proposal, or `None` until votes are tallied
    pub async fn winning_proposal(&self) -> Result<Option<Proposal>, ClientError> {
        if self.ledger.workflow_stage().await? != WorkflowStage::VotesTallied {
            return Ok(None);
        }
        let id = self.ledger.winning_proposal_id().await?;
        Ok(Some(self.ledger.proposal(id).await?))
    }
}
