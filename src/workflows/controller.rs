use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state_machine::{StageEvent, StageTracker};
use crate::config::ClientConfig;
use crate::contract::{Address, ChangeEvent, Operation, OperationRegistry, WorkflowStage};
use crate::error::ClientError;
use crate::events::{ChangeEventWatcher, WatchHandle};
use crate::ledger::Ledger;
use crate::observability::OperationTimer;
use crate::submission::{ConfirmationTracker, TrackedOutcome, TransactionSubmitter};

/// A stage change noticed through the ledger's event feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChange {
    pub previous: WorkflowStage,
    pub new: WorkflowStage,
    /// Stage read back from the ledger after the notification
    pub current: WorkflowStage,
    pub observed_at: DateTime<Utc>,
}

impl StageChange {
    pub fn describe(&self) -> String {
        format!("Changed from \"{}\" to \"{}\"", self.previous.label(), self.new.label())
    }
}

/// Drives the contract's workflow forward on behalf of its owner and keeps a
/// local view of the current stage in step with the ledger.
pub struct WorkflowStatusController {
    ledger: Arc<dyn Ledger>,
    registry: OperationRegistry,
    submitter: TransactionSubmitter,
    tracker: ConfirmationTracker,
    watcher: ChangeEventWatcher,
    stages: StageTracker,
    owner: Option<Address>,
    event_name: String,
    /// Operation whose confirmation the tracker is waiting on
    pending_operation: Option<Operation>,
    notifications: Option<mpsc::UnboundedReceiver<ChangeEvent>>,
    subscription: Option<WatchHandle>,
}

impl std::fmt::Debug for WorkflowStatusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStatusController")
            .field("stage", &self.stages.stage())
            .field("owner", &self.owner)
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}

impl WorkflowStatusController {
    pub fn new(ledger: Arc<dyn Ledger>, config: &ClientConfig) -> Self {
        Self {
            submitter: TransactionSubmitter::new(Arc::clone(&ledger)),
            tracker: ConfirmationTracker::new(Arc::clone(&ledger), config.confirmation.poll_interval()),
            ledger,
            registry: OperationRegistry::new(),
            watcher: ChangeEventWatcher::new(),
            stages: StageTracker::new(),
            owner: None,
            event_name: config.events.event_name.clone(),
            pending_operation: None,
            notifications: None,
            subscription: None,
        }
    }

    /// Read the owner and stage, then subscribe to change events.
    /// Calling it again refreshes both without subscribing twice.
    pub async fn start(&mut self) -> Result<WorkflowStage, ClientError> {
        let owner = self.ledger.owner().await?;
        info!(owner = %owner, account = %self.ledger.account(), "Workflow controller starting");
        self.owner = Some(owner);

        if self.subscription.is_none() {
            // unbounded: the watcher already dedups, so every entry is a real change
            let (sender, receiver) = mpsc::unbounded_channel();
            let handle = self
                .watcher
                .subscribe(self.ledger.as_ref(), &self.event_name, move |event| {
                    if sender.send(event).is_err() {
                        debug!("Change notification after controller shutdown");
                    }
                })
                .await?;
            self.notifications = Some(receiver);
            self.subscription = Some(handle);
        }

        self.refresh_stage().await
    }

    pub fn current_stage(&self) -> WorkflowStage {
        self.stages.stage()
    }

    /// Whether the connected account owns the contract. False until
    /// [`WorkflowStatusController::start`] has read the owner.
    pub fn is_owner(&self) -> bool {
        self.owner.as_ref() == Some(&self.ledger.account())
    }

    /// Operation that advances from the current stage, `None` at the end
    pub fn next_operation(&self) -> Option<Operation> {
        self.registry.operation_for_stage(self.current_stage().index())
    }

    pub fn in_flight(&self) -> bool {
        self.submitter.in_flight()
    }

    pub fn confirmation_pending(&self) -> bool {
        self.tracker.is_pending()
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.submitter.last_error()
    }

    pub fn latest_event(&self) -> Option<ChangeEvent> {
        self.watcher.latest()
    }

    /// Re-read the stage from the ledger, which always wins over the local view
    pub async fn refresh_stage(&mut self) -> Result<WorkflowStage, ClientError> {
        let stage = self.ledger.workflow_stage().await?;
        let local = self.stages.apply(StageEvent::Synced(stage));
        debug!(stage = %local, "Stage refreshed from ledger");
        Ok(local)
    }

    /// Submit whichever operation advances the current stage
    pub async fn advance(&mut self) -> Result<WorkflowStage, ClientError> {
        let operation = self.next_operation().ok_or(ClientError::TerminalStage)?;
        self.request_transition(operation).await
    }

    /// Submit `operation` and wait for its confirmation. Checks ownership,
    /// the terminal stage and the transition table before anything is sent.
    ///
    /// If this future is dropped after submission the handle stays armed;
    /// finish it with [`WorkflowStatusController::await_confirmation`] or
    /// abandon it with [`WorkflowStatusController::reset`].
    pub async fn request_transition(&mut self, operation: Operation) -> Result<WorkflowStage, ClientError> {
        if self.in_flight() || self.confirmation_pending() {
            return Err(ClientError::SubmissionInProgress);
        }
        if operation.requires_owner() && !self.is_owner() {
            return Err(self.refuse(ClientError::NotOwner));
        }

        let stage = self.current_stage();
        let Some(expected) = self.registry.operation_for_stage(stage.index()) else {
            return Err(self.refuse(ClientError::TerminalStage));
        };
        if operation != expected {
            return Err(self.refuse(ClientError::IllegalTransition {
                stage,
                requested: operation,
            }));
        }

        let timer = OperationTimer::new(operation.name());
        let handle = self.submitter.submit_operation(operation, Vec::new()).await?;
        self.tracker.arm(handle);
        self.pending_operation = Some(operation);

        let result = self.await_confirmation().await;
        timer.finish();
        result
    }

    /// Wait for the armed transition, if any, to resolve. Picks up a
    /// confirmation left behind when a `request_transition` future was
    /// dropped; returns the current stage when nothing is pending.
    pub async fn await_confirmation(&mut self) -> Result<WorkflowStage, ClientError> {
        let Some(operation) = self.pending_operation else {
            return Ok(self.current_stage());
        };

        let outcome = self.tracker.wait().await;
        self.pending_operation = None;
        match outcome {
            Some(TrackedOutcome::Confirmed(handle)) => {
                info!(operation = %operation, handle = %handle, "Workflow transition confirmed");
                self.stages.apply(StageEvent::Advanced(operation));
                match self.refresh_stage().await {
                    Ok(stage) => Ok(stage),
                    Err(error) => {
                        warn!(error = %error, "Could not re-read stage after confirmation");
                        Ok(self.current_stage())
                    }
                }
            }
            Some(TrackedOutcome::Failed(error)) => {
                self.submitter.record_error(error.clone());
                Err(error)
            }
            None => Ok(self.current_stage()),
        }
    }

    /// Wait for the next distinct change event, then re-read the stage.
    /// `None` once the subscription is gone or was never started.
    pub async fn next_change(&mut self) -> Option<StageChange> {
        let event = self.notifications.as_mut()?.recv().await?;
        let observed_at = Utc::now();
        let current = match self.refresh_stage().await {
            Ok(stage) => stage,
            Err(error) => {
                warn!(error = %error, "Stage re-read after change event failed");
                self.current_stage()
            }
        };
        self.watcher.clear_latest();

        let change = StageChange {
            previous: event.previous_stage,
            new: event.new_stage,
            current,
            observed_at,
        };
        info!("{}", change.describe());
        Some(change)
    }

    /// Abandon any in-flight or pending submission and clear errors
    pub fn reset(&mut self) {
        self.submitter.reset();
        self.tracker.disarm();
        self.pending_operation = None;
    }

    /// Stop listening for change events
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
        self.notifications = None;
    }

    fn refuse(&self, error: ClientError) -> ClientError {
        warn!(error = %error, "Workflow transition refused");
        self.submitter.record_error(error.clone());
        error
    }
}

impl Drop for WorkflowStatusController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractCall, TransactionHandle};
    use crate::ledger::{InMemoryLedger, LogSubscription, MockLedger, ReceiptStatus};
    use std::time::Duration;

    fn owner() -> Address {
        Address::parse("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap()
    }

    fn stranger() -> Address {
        Address::parse("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap()
    }

    fn fast_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.confirmation.poll_interval_ms = 5;
        config
    }

    fn owner_mock(stage: WorkflowStage) -> MockLedger {
        let mut mock = MockLedger::new();
        mock.expect_account().returning(owner);
        mock.expect_owner().returning(|| Ok(owner()));
        mock.expect_workflow_stage().returning(move || Ok(stage));
        mock.expect_subscribe_events()
            .returning(|_| Ok(LogSubscription::channel(1).1));
        mock
    }

    #[tokio::test]
    async fn test_next_operation_follows_stage() {
        let mut controller =
            WorkflowStatusController::new(Arc::new(owner_mock(WorkflowStage::ProposalsRegistrationEnded)), &fast_config());

        controller.start().await.unwrap();

        assert_eq!(controller.current_stage(), WorkflowStage::ProposalsRegistrationEnded);
        assert_eq!(controller.next_operation(), Some(Operation::StartVotingSession));
        assert!(controller.is_owner());
    }

    #[tokio::test]
    async fn test_illegal_transition_never_submits() {
        let mut mock = owner_mock(WorkflowStage::RegisteringVoters);
        mock.expect_submit().never();
        let mut controller = WorkflowStatusController::new(Arc::new(mock), &fast_config());
        controller.start().await.unwrap();

        let err = controller.request_transition(Operation::TallyVotes).await.unwrap_err();

        assert_eq!(
            err,
            ClientError::IllegalTransition {
                stage: WorkflowStage::RegisteringVoters,
                requested: Operation::TallyVotes,
            }
        );
        assert_eq!(controller.last_error(), Some(err));
        assert!(!controller.in_flight());
    }

    #[tokio::test]
    async fn test_terminal_stage_is_refused() {
        let mut mock = owner_mock(WorkflowStage::VotesTallied);
        mock.expect_submit().never();
        let mut controller = WorkflowStatusController::new(Arc::new(mock), &fast_config());
        controller.start().await.unwrap();

        assert_eq!(controller.next_operation(), None);
        assert_eq!(controller.advance().await, Err(ClientError::TerminalStage));
        assert_eq!(
            controller.request_transition(Operation::TallyVotes).await,
            Err(ClientError::TerminalStage)
        );
    }

    #[tokio::test]
    async fn test_non_owner_is_refused_before_submission() {
        let mut mock = MockLedger::new();
        mock.expect_account().returning(stranger);
        mock.expect_owner().returning(|| Ok(owner()));
        mock.expect_workflow_stage().returning(|| Ok(WorkflowStage::RegisteringVoters));
        mock.expect_subscribe_events()
            .returning(|_| Ok(LogSubscription::channel(1).1));
        mock.expect_submit().never();
        let mut controller = WorkflowStatusController::new(Arc::new(mock), &fast_config());
        controller.start().await.unwrap();

        assert!(!controller.is_owner());
        assert_eq!(controller.advance().await, Err(ClientError::NotOwner));
    }

    #[tokio::test]
    async fn test_advance_waits_for_confirmation_then_rereads_stage() {
        let ledger = InMemoryLedger::deploy(owner());
        ledger.set_confirmation_polls(2);
        let mut controller = WorkflowStatusController::new(Arc::new(ledger.clone()), &fast_config());
        controller.start().await.unwrap();

        let stage = controller.advance().await.unwrap();

        assert_eq!(stage, WorkflowStage::ProposalsRegistrationStarted);
        assert_eq!(controller.next_operation(), Some(Operation::EndProposalsRegistering));
        assert!(!controller.confirmation_pending());
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_reverted_transition_surfaces_failure() {
        let ledger = InMemoryLedger::deploy(owner());
        ledger.revert_next_submission("out of gas");
        let mut controller = WorkflowStatusController::new(Arc::new(ledger), &fast_config());
        controller.start().await.unwrap();

        let err = controller.advance().await.unwrap_err();

        assert!(matches!(err, ClientError::ConfirmationFailed { ref message, .. } if message == "out of gas"));
        assert_eq!(controller.current_stage(), WorkflowStage::RegisteringVoters);
        assert_eq!(controller.last_error(), Some(err));
    }

    #[tokio::test]
    async fn test_rejected_submission_keeps_stage() {
        let mut mock = owner_mock(WorkflowStage::RegisteringVoters);
        mock.expect_submit()
            .times(1)
            .returning(|_: &ContractCall| Err(crate::ledger::LedgerError::new("Ownable: caller is not the owner")));
        mock.expect_receipt().never();
        let mut controller = WorkflowStatusController::new(Arc::new(mock), &fast_config());
        controller.start().await.unwrap();

        let err = controller.advance().await.unwrap_err();

        assert_eq!(err.user_message(), "Ownable: caller is not the owner");
        assert_eq!(controller.current_stage(), WorkflowStage::RegisteringVoters);
        assert!(!controller.in_flight());
    }

    #[tokio::test]
    async fn test_confirmation_polls_until_final() {
        let mut mock = owner_mock(WorkflowStage::RegisteringVoters);
        mock.expect_submit()
            .times(1)
            .returning(|_| Ok(TransactionHandle::new("0xabc")));
        let mut seq = mockall::Sequence::new();
        mock.expect_receipt()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ReceiptStatus::Pending));
        mock.expect_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ReceiptStatus::Confirmed));
        let mut controller = WorkflowStatusController::new(Arc::new(mock), &fast_config());
        controller.start().await.unwrap();

        // the mock keeps reporting the old stage, which wins over the local advance
        let stage = controller.advance().await.unwrap();
        assert_eq!(stage, WorkflowStage::RegisteringVoters);
    }

    #[tokio::test]
    async fn test_change_events_are_deduplicated_and_trigger_reread() {
        let ledger = InMemoryLedger::deploy(owner());
        ledger.set_redeliver_events(true);
        let mut controller = WorkflowStatusController::new(Arc::new(ledger.clone()), &fast_config());
        controller.start().await.unwrap();

        // another session advances the contract
        let other = ledger.connect(owner());
        other
            .submit(&ContractCall::new(Operation::StartProposalsRegistering, Vec::new()))
            .await
            .unwrap();

        let change = tokio::time::timeout(Duration::from_secs(1), controller.next_change())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.previous, WorkflowStage::RegisteringVoters);
        assert_eq!(change.new, WorkflowStage::ProposalsRegistrationStarted);
        assert_eq!(change.current, WorkflowStage::ProposalsRegistrationStarted);
        assert_eq!(change.describe(), "Changed from \"Registering voters\" to \"Proposals open\"");

        // the redelivered copy must not produce a second change
        let again = tokio::time::timeout(Duration::from_millis(50), controller.next_change()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_dropped_transition_can_be_resumed() {
        let ledger = InMemoryLedger::deploy(owner());
        ledger.set_confirmation_polls(1_000);
        let mut controller = WorkflowStatusController::new(Arc::new(ledger.clone()), &fast_config());
        controller.start().await.unwrap();

        // the caller gives up waiting after submission
        let gave_up = tokio::time::timeout(Duration::from_millis(30), controller.advance()).await;
        assert!(gave_up.is_err());
        assert!(controller.confirmation_pending());
        assert!(!controller.in_flight());
        assert_eq!(controller.advance().await, Err(ClientError::SubmissionInProgress));

        ledger.mine_all();
        let stage = controller.await_confirmation().await.unwrap();

        assert_eq!(stage, WorkflowStage::ProposalsRegistrationStarted);
        assert!(!controller.confirmation_pending());
        assert_eq!(controller.next_operation(), Some(Operation::EndProposalsRegistering));

        ledger.set_confirmation_polls(0);
        assert_eq!(
            controller.advance().await,
            Ok(WorkflowStage::ProposalsRegistrationEnded)
        );
        assert_eq!(ledger.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_await_confirmation_with_nothing_pending_returns_stage() {
        let mut controller =
            WorkflowStatusController::new(Arc::new(owner_mock(WorkflowStage::VotingSessionStarted)), &fast_config());
        controller.start().await.unwrap();

        assert_eq!(
            controller.await_confirmation().await,
            Ok(WorkflowStage::VotingSessionStarted)
        );
    }

    #[tokio::test]
    async fn test_burst_of_distinct_changes_is_not_dropped() {
        let ledger = InMemoryLedger::deploy(owner());
        let mut controller = WorkflowStatusController::new(Arc::new(ledger.clone()), &fast_config());
        controller.start().await.unwrap();

        let stages = WorkflowStage::ALL;
        for (i, tx) in ["0xa", "0xb", "0xc", "0xd"].into_iter().enumerate() {
            ledger.inject_batch(vec![ChangeEvent {
                transaction_id: tx.to_string(),
                log_index: 0,
                previous_stage: stages[i],
                new_stage: stages[i + 1],
            }]);
        }

        for i in 0..4 {
            let change = tokio::time::timeout(Duration::from_secs(1), controller.next_change())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(change.previous, stages[i]);
            assert_eq!(change.new, stages[i + 1]);
        }
    }

    #[tokio::test]
    async fn test_next_change_without_start_is_none() {
        let mut controller = WorkflowStatusController::new(Arc::new(MockLedger::new()), &fast_config());
        assert!(controller.next_change().await.is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_last_error() {
        let mut mock = owner_mock(WorkflowStage::RegisteringVoters);
        mock.expect_submit().never();
        let mut controller = WorkflowStatusController::new(Arc::new(mock), &fast_config());
        controller.start().await.unwrap();
        let _ = controller.request_transition(Operation::EndVotingSession).await;

        controller.reset();

        assert!(controller.last_error().is_none());
        assert!(!controller.confirmation_pending());
    }
}
