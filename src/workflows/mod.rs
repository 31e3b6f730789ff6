// Workflow stage tracking and owner-driven advancement
// The ledger's reported stage is the source of truth

pub mod controller;
pub mod state_machine;

pub use controller::{StageChange, WorkflowStatusController};
pub use state_machine::{StageEvent, StageTracker, WorkflowMachine};
