use thiserror::Error;

use crate::contract::{Operation, TransactionHandle, WorkflowStage};

/// Fallback text when the ledger gives no usable message
pub const DEFAULT_LEDGER_MESSAGE: &str = "Transaction failed.";

/// Failure reported by the ledger, normalized once where the call returns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LedgerError {
    pub message: String,
}

impl LedgerError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return Self {
                message: DEFAULT_LEDGER_MESSAGE.to_string(),
            };
        }
        Self { message }
    }

    /// Builds the error from the optional fields a ledger transport exposes.
    /// Precedence: short message, then message, then details.
    pub fn from_parts(
        short_message: Option<&str>,
        message: Option<&str>,
        details: Option<&str>,
    ) -> Self {
        let chosen = [short_message, message, details]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_LEDGER_MESSAGE);
        Self::new(chosen)
    }
}

/// Everything the coordination layer reports to its caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Invalid function: {name}")]
    InvalidOperation { name: String },
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("A submission is already in progress")]
    SubmissionInProgress,
    #[error("Submission rejected: {message}")]
    SubmissionRejected { message: String },
    #[error("Transaction {handle} failed: {message}")]
    ConfirmationFailed {
        handle: TransactionHandle,
        message: String,
    },
    #[error("{requested} cannot be applied while the workflow is at {stage}")]
    IllegalTransition {
        stage: WorkflowStage,
        requested: Operation,
    },
    #[error("Workflow is already at its final stage")]
    TerminalStage,
    #[error("Only the contract owner may do this")]
    NotOwner,
    #[error("Ledger read failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl ClientError {
    /// Message suitable for showing as-is in the UI
    pub fn user_message(&self) -> String {
        match self {
            ClientError::SubmissionRejected { message } => message.clone(),
            ClientError::ConfirmationFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_precedence() {
        let err = LedgerError::from_parts(Some("short"), Some("long"), Some("details"));
        assert_eq!(err.message, "short");

        let err = LedgerError::from_parts(None, Some("long"), Some("details"));
        assert_eq!(err.message, "long");

        let err = LedgerError::from_parts(Some("  "), None, Some("details"));
        assert_eq!(err.message, "details");

        let err = LedgerError::from_parts(None, None, None);
        assert_eq!(err.message, DEFAULT_LEDGER_MESSAGE);
    }

    #[test]
    fn test_user_message_surfaces_ledger_text_verbatim() {
        let err = ClientError::SubmissionRejected {
            message: "Ownable: caller is not the owner".into(),
        };
        assert_eq!(err.user_message(), "Ownable: caller is not the owner");

        let err = ClientError::InvalidOperation { name: "drain".into() };
        assert_eq!(err.user_message(), "Invalid function: drain");
    }
}
