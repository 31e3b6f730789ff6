// Workflow stages of the voting contract

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ClientError;

/// The six ordered phases of a voting round, as reported by `workflowStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkflowStage {
    RegisteringVoters = 0,
    ProposalsRegistrationStarted = 1,
    ProposalsRegistrationEnded = 2,
    VotingSessionStarted = 3,
    VotingSessionEnded = 4,
    VotesTallied = 5,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 6] = [
        WorkflowStage::RegisteringVoters,
        WorkflowStage::ProposalsRegistrationStarted,
        WorkflowStage::ProposalsRegistrationEnded,
        WorkflowStage::VotingSessionStarted,
        WorkflowStage::VotingSessionEnded,
        WorkflowStage::VotesTallied,
    ];

    pub const INITIAL: WorkflowStage = WorkflowStage::RegisteringVoters;
    pub const TERMINAL: WorkflowStage = WorkflowStage::VotesTallied;

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The stage directly after this one, `None` once tallied
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::TERMINAL
    }

    /// Name as emitted by the contract enum
    pub fn name(self) -> &'static str {
        match self {
            WorkflowStage::RegisteringVoters => "RegisteringVoters",
            WorkflowStage::ProposalsRegistrationStarted => "ProposalsRegistrationStarted",
            WorkflowStage::ProposalsRegistrationEnded => "ProposalsRegistrationEnded",
            WorkflowStage::VotingSessionStarted => "VotingSessionStarted",
            WorkflowStage::VotingSessionEnded => "VotingSessionEnded",
            WorkflowStage::VotesTallied => "VotesTallied",
        }
    }

    /// Human-readable label for notifications
    pub fn label(self) -> &'static str {
        match self {
            WorkflowStage::RegisteringVoters => "Registering voters",
            WorkflowStage::ProposalsRegistrationStarted => "Proposals open",
            WorkflowStage::ProposalsRegistrationEnded => "Proposals closed",
            WorkflowStage::VotingSessionStarted => "Voting open",
            WorkflowStage::VotingSessionEnded => "Voting closed",
            WorkflowStage::VotesTallied => "Votes tallied",
        }
    }
}

impl TryFrom<u8> for WorkflowStage {
    type Error = ClientError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or_else(|| ClientError::InvalidArgument {
            reason: format!("unknown workflow stage index {index}"),
        })
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
