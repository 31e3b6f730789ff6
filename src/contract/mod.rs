// Contract vocabulary: operations, workflow stages and the values passed to the ledger

pub mod operations;
pub mod stage;
pub mod types;

pub use operations::{Operation, OperationRegistry};
pub use stage::WorkflowStage;
pub use types::{
    Address, CallArg, ChangeEvent, ContractCall, EventKey, Proposal, TransactionHandle, Voter,
};
