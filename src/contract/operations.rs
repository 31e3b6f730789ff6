//! Operation vocabulary and the stage → operation table
//!
//! The table here is the single source of truth for which contract function
//! moves the workflow forward. Anything tied to workflow advancement consults
//! it before submitting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::stage::WorkflowStage;
use crate::error::ClientError;

/// Every contract function this client may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "addVoter")]
    AddVoter,
    #[serde(rename = "startProposalsRegistering")]
    StartProposalsRegistering,
    #[serde(rename = "endProposalsRegistering")]
    EndProposalsRegistering,
    #[serde(rename = "startVotingSession")]
    StartVotingSession,
    #[serde(rename = "endVotingSession")]
    EndVotingSession,
    #[serde(rename = "tallyVotes")]
    TallyVotes,
    #[serde(rename = "addProposal")]
    AddProposal,
    #[serde(rename = "setVote")]
    SetVote,
    #[serde(rename = "getVoter")]
    GetVoter,
    #[serde(rename = "getOneProposal")]
    GetOneProposal,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::AddVoter,
        Operation::StartProposalsRegistering,
        Operation::EndProposalsRegistering,
        Operation::StartVotingSession,
        Operation::EndVotingSession,
        Operation::TallyVotes,
        Operation::AddProposal,
        Operation::SetVote,
        Operation::GetVoter,
        Operation::GetOneProposal,
    ];

    /// Contract function name
    pub fn name(self) -> &'static str {
        match self {
            Operation::AddVoter => "addVoter",
            Operation::StartProposalsRegistering => "startProposalsRegistering",
            Operation::EndProposalsRegistering => "endProposalsRegistering",
            Operation::StartVotingSession => "startVotingSession",
            Operation::EndVotingSession => "endVotingSession",
            Operation::TallyVotes => "tallyVotes",
            Operation::AddProposal => "addProposal",
            Operation::SetVote => "setVote",
            Operation::GetVoter => "getVoter",
            Operation::GetOneProposal => "getOneProposal",
        }
    }

    /// Only the contract owner may call these
    pub fn requires_owner(self) -> bool {
        matches!(
            self,
            Operation::AddVoter
                | Operation::StartProposalsRegistering
                | Operation::EndProposalsRegistering
                | Operation::StartVotingSession
                | Operation::EndVotingSession
                | Operation::TallyVotes
        )
    }
}

impl FromStr for Operation {
    type Err = ClientError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| ClientError::InvalidOperation {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// (stage entered, operation that enters it)
const ADVANCEMENT_TABLE: [(WorkflowStage, Operation); 5] = [
    (WorkflowStage::ProposalsRegistrationStarted, Operation::StartProposalsRegistering),
    (WorkflowStage::ProposalsRegistrationEnded, Operation::EndProposalsRegistering),
    (WorkflowStage::VotingSessionStarted, Operation::StartVotingSession),
    (WorkflowStage::VotingSessionEnded, Operation::EndVotingSession),
    (WorkflowStage::VotesTallied, Operation::TallyVotes),
];

/// Static lookups over the operation vocabulary
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationRegistry;

impl OperationRegistry {
    pub fn new() -> Self {
        Self
    }

    /// True iff `name` is one of the ten contract function names
    pub fn is_valid(&self, name: &str) -> bool {
        name.parse::<Operation>().is_ok()
    }

    /// The operation that moves the workflow from `stage_index` to the next
    /// stage. `None` at the terminal stage and for unknown indices.
    pub fn operation_for_stage(&self, stage_index: u8) -> Option<Operation> {
        let next = WorkflowStage::from_index(stage_index)?.next()?;
        self.operation_entering(next.index())
    }

    /// The operation whose confirmation enters `stage_index`. `None` for the
    /// initial stage, which needs no action to enter.
    pub fn operation_entering(&self, stage_index: u8) -> Option<Operation> {
        ADVANCEMENT_TABLE
            .iter()
            .find(|(stage, _)| stage.index() == stage_index)
            .map(|(_, op)| *op)
    }

    pub fn is_advancing(&self, op: Operation) -> bool {
        self.stage_reached_by(op).is_some()
    }

    pub fn stage_reached_by(&self, op: Operation) -> Option<WorkflowStage> {
        ADVANCEMENT_TABLE
            .iter()
            .find(|(_, candidate)| *candidate == op)
            .map(|(stage, _)| *stage)
    }
}
