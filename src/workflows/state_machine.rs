use statig::prelude::*;
use tracing::{debug, warn};

use crate::contract::{Operation, OperationRegistry, WorkflowStage};

/// Inputs to the local stage mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// A confirmed advancing operation
    Advanced(Operation),
    /// Stage read back from the ledger, which always wins
    Synced(WorkflowStage),
}

/// Local mirror of the contract's workflow stage.
///
/// `Advanced` only moves forward along the registry's table; anything else
/// is ignored. `Synced` jumps straight to the ledger's value.
#[derive(Debug, Default)]
pub struct WorkflowMachine {
    registry: OperationRegistry,
    ignored_events: u32,
}

impl WorkflowMachine {
    pub fn ignored_events(&self) -> u32 {
        self.ignored_events
    }

    fn step(&mut self, current: WorkflowStage, event: &StageEvent) -> Outcome<State> {
        match *event {
            StageEvent::Advanced(operation) => {
                if self.registry.operation_for_stage(current.index()) != Some(operation) {
                    self.ignored_events += 1;
                    warn!(stage = %current, operation = %operation, "Operation does not advance this stage");
                    return Handled;
                }
                match current.next() {
                    Some(next) => {
                        debug!(from = %current, to = %next, "Stage advanced");
                        Transition(state_for(next))
                    }
                    None => Handled,
                }
            }
            StageEvent::Synced(stage) if stage == current => Handled,
            StageEvent::Synced(stage) => {
                if stage < current {
                    warn!(local = %current, ledger = %stage, "Ledger reports an earlier stage");
                }
                Transition(state_for(stage))
            }
        }
    }
}

#[state_machine(initial = "State::registering_voters()", state(derive(Debug, Clone, PartialEq, Eq)))]
impl WorkflowMachine {
    #[state]
    fn registering_voters(&mut self, event: &StageEvent) -> Outcome<State> {
        self.step(WorkflowStage::RegisteringVoters, event)
    }

    #[state]
    fn proposals_registration_started(&mut self, event: &StageEvent) -> Outcome<State> {
        self.step(WorkflowStage::ProposalsRegistrationStarted, event)
    }

    #[state]
    fn proposals_registration_ended(&mut self, event: &StageEvent) -> Outcome<State> {
        self.step(WorkflowStage::ProposalsRegistrationEnded, event)
    }

    #[state]
    fn voting_session_started(&mut self, event: &StageEvent) -> Outcome<State> {
        self.step(WorkflowStage::VotingSessionStarted, event)
    }

    #[state]
    fn voting_session_ended(&mut self, event: &StageEvent) -> Outcome<State> {
        self.step(WorkflowStage::VotingSessionEnded, event)
    }

    #[state]
    fn votes_tallied(&mut self, event: &StageEvent) -> Outcome<State> {
        self.step(WorkflowStage::VotesTallied, event)
    }
}

fn state_for(stage: WorkflowStage) -> State {
    match stage {
        WorkflowStage::RegisteringVoters => State::registering_voters(),
        WorkflowStage::ProposalsRegistrationStarted => State::proposals_registration_started(),
        WorkflowStage::ProposalsRegistrationEnded => State::proposals_registration_ended(),
        WorkflowStage::VotingSessionStarted => State::voting_session_started(),
        WorkflowStage::VotingSessionEnded => State::voting_session_ended(),
        WorkflowStage::VotesTallied => State::votes_tallied(),
    }
}

fn stage_of(state: &State) -> WorkflowStage {
    match state {
        State::RegisteringVoters {} => WorkflowStage::RegisteringVoters,
        State::ProposalsRegistrationStarted {} => WorkflowStage::ProposalsRegistrationStarted,
        State::ProposalsRegistrationEnded {} => WorkflowStage::ProposalsRegistrationEnded,
        State::VotingSessionStarted {} => WorkflowStage::VotingSessionStarted,
        State::VotingSessionEnded {} => WorkflowStage::VotingSessionEnded,
        State::VotesTallied {} => WorkflowStage::VotesTallied,
    }
}

/// Owns the running state machine and answers in [`WorkflowStage`] terms
pub struct StageTracker {
    machine: StateMachine<WorkflowMachine>,
}

impl std::fmt::Debug for StageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageTracker").field("stage", &self.stage()).finish()
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            machine: WorkflowMachine::default().state_machine(),
        }
    }

    pub fn stage(&self) -> WorkflowStage {
        stage_of(self.machine.state())
    }

    /// Feed one event and return the resulting stage
    pub fn apply(&mut self, event: StageEvent) -> WorkflowStage {
        self.machine.handle(&event);
        self.stage()
    }

    pub fn ignored_events(&self) -> u32 {
        self.machine.inner().ignored_events()
    }
}
