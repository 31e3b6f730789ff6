// Value types exchanged with the ledger

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::operations::Operation;
use super::stage::WorkflowStage;
use crate::error::ClientError;

/// Account address: `0x` followed by 40 hex digits. Stored lowercase so
/// equality ignores checksum casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub const LEN: usize = 42;

    pub fn parse(input: &str) -> Result<Self, ClientError> {
        let trimmed = input.trim();
        let Some(digits) = trimmed.strip_prefix("0x") else {
            return Err(ClientError::InvalidArgument {
                reason: format!("address {trimmed:?} must start with 0x"),
            });
        };
        if trimmed.len() != Self::LEN {
            return Err(ClientError::InvalidArgument {
                reason: format!(
                    "address {trimmed:?} must be {} characters, got {}",
                    Self::LEN,
                    trimmed.len()
                ),
            });
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ClientError::InvalidArgument {
                reason: format!("address {trimmed:?} contains non-hex characters"),
            });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the ledger hands back for an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle(String);

impl TransactionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Positional argument of a contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CallArg {
    Address(Address),
    Text(String),
    Uint(u64),
}

impl CallArg {
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            CallArg::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CallArg::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            CallArg::Uint(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub operation: Operation,
    pub args: Vec<CallArg>,
}

impl ContractCall {
    pub fn new(operation: Operation, args: Vec<CallArg>) -> Self {
        Self { operation, args }
    }
}

/// Dedup identity of a ledger log entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub transaction_id: String,
    pub log_index: u64,
}

/// `WorkflowStatusChange` log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub transaction_id: String,
    pub log_index: u64,
    pub previous_stage: WorkflowStage,
    pub new_stage: WorkflowStage,
}

impl ChangeEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            transaction_id: self.transaction_id.clone(),
            log_index: self.log_index,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub is_registered: bool,
    pub has_voted: bool,
    pub voted_proposal_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub description: String,
    pub vote_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn test_address_accepts_checksummed_hex() {
        let address = Address::parse(VALID).unwrap();
        assert_eq!(address.as_str(), VALID.to_ascii_lowercase());
        assert_eq!(address, Address::parse(&VALID.to_ascii_lowercase()).unwrap());
    }

    #[test]
    fn test_address_rejects_bad_formats() {
        for input in [
            "not-an-address",
            "5FbDB2315678afecb367f032d93F642f64180aa3",
            "0x5FbDB2315678afecb367f032d93F642f64180aa",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3b",
            "0xZZbDB2315678afecb367f032d93F642f64180aa3",
            "",
        ] {
            assert!(
                matches!(Address::parse(input), Err(ClientError::InvalidArgument { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_call_arg_serialization_shape() {
        let arg = CallArg::Uint(3);
        let json = serde_json::to_value(&arg).unwrap();
        assert_eq!(json, serde_json::json!({"type": "uint", "value": 3}));

        let call = ContractCall::new(Operation::AddVoter, vec![CallArg::Address(Address::parse(VALID).unwrap())]);
        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains("\"addVoter\""));
    }

    #[test]
    fn test_event_key_ignores_stages() {
        let a = ChangeEvent {
            transaction_id: "0xabc".into(),
            log_index: 0,
            previous_stage: WorkflowStage::RegisteringVoters,
            new_stage: WorkflowStage::ProposalsRegistrationStarted,
        };
        let b = ChangeEvent {
            previous_stage: WorkflowStage::VotingSessionStarted,
            new_stage: WorkflowStage::VotingSessionEnded,
            ..a.clone()
        };
        assert_eq!(a.key(), b.key());
    }
}
