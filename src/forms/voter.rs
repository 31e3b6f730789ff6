use std::sync::Arc;
use std::time::Duration;

use super::FormSession;
use crate::contract::{Address, CallArg, Operation, TransactionHandle};
use crate::error::ClientError;
use crate::ledger::Ledger;
use crate::submission::TrackedOutcome;

/// Owner-only form that whitelists one voter address
pub struct RegisterVoterForm {
    ledger: Arc<dyn Ledger>,
    session: FormSession,
    address: String,
}

impl std::fmt::Debug for RegisterVoterForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterVoterForm")
            .field("account", &self.ledger.account())
            .field("session", &self.session)
            .field("address", &self.address)
            .finish()
    }
}

impl RegisterVoterForm {
    pub fn new(ledger: Arc<dyn Ledger>, poll_interval: Duration) -> Self {
        Self {
            session: FormSession::new(Arc::clone(&ledger), poll_interval),
            ledger,
            address: String::new(),
        }
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn can_submit(&self) -> bool {
        !self.address.trim().is_empty() && !self.session.is_busy()
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    /// Check the address, then that the connected account owns the
    /// contract, then submit. Nothing reaches the ledger if either fails.
    pub async fn submit(&mut self) -> Result<TransactionHandle, ClientError> {
        if self.session.is_busy() {
            return Err(ClientError::SubmissionInProgress);
        }
        let address = Address::parse(self.address.trim()).map_err(|error| self.session.fail(error))?;
        if Operation::AddVoter.requires_owner() {
            self.require_owner().await.map_err(|error| self.session.fail(error))?;
        }
        self.session
            .submit(Operation::AddVoter, vec![CallArg::Address(address)])
            .await
    }

    async fn require_owner(&self) -> Result<(), ClientError> {
        let owner = self.ledger.owner().await?;
        if owner != self.ledger.account() {
            return Err(ClientError::NotOwner);
        }
        Ok(())
    }

    /// Wait for confirmation. The address field is cleared when it lands.
    pub async fn settle(&mut self) -> Option<TrackedOutcome> {
        let outcome = self.session.settle().await?;
        if matches!(outcome, TrackedOutcome::Confirmed(_)) {
            self.address.clear();
        }
        Some(outcome)
    }
}
