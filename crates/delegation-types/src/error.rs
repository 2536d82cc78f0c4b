//! Protocol Errors
//!
//! Every rejection either ledger can return. A rejected transaction applies
//! none of its instructions.

use serde::Serialize;
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtocolError {
    #[error("Account is already delegated")]
    AlreadyDelegated,

    #[error("Account is not delegated")]
    NotDelegated,

    #[error("Stale commit: seq {submitted} does not advance past {last}")]
    StaleCommit { submitted: u64, last: u64 },

    #[error("Writer is not the current authority for this account")]
    UnauthorizedWriter,

    #[error("Account not initialized")]
    AccountNotInitialized,

    #[error("Account already initialized")]
    AccountAlreadyInitialized,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Invalid authority")]
    InvalidAuthority,

    #[error("Commitment does not match the delegation or the payload")]
    InvalidCommitment,

    #[error("Undelegate must follow a commit of the same account in one transaction")]
    MissingFinalCommit,

    #[error("Account is being undelegated")]
    UndelegationPending,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Blockhash not found")]
    BlockhashNotFound,

    #[error("Transaction already processed")]
    AlreadyProcessed,

    #[error("Invalid instruction data")]
    InvalidInstructionData,

    #[error("Unknown program")]
    UnknownProgram,
}

impl ProtocolError {
    /// Stable numeric code, used on the RPC surface
    pub fn code(&self) -> u32 {
        match self {
            ProtocolError::AlreadyDelegated => 0,
            ProtocolError::NotDelegated => 1,
            ProtocolError::StaleCommit { .. } => 2,
            ProtocolError::UnauthorizedWriter => 3,
            ProtocolError::AccountNotInitialized => 4,
            ProtocolError::AccountAlreadyInitialized => 5,
            ProtocolError::InvalidAmount => 6,
            ProtocolError::ArithmeticOverflow => 7,
            ProtocolError::InvalidAuthority => 8,
            ProtocolError::InvalidCommitment => 9,
            ProtocolError::MissingFinalCommit => 10,
            ProtocolError::UndelegationPending => 11,
            ProtocolError::InvalidSignature => 12,
            ProtocolError::BlockhashNotFound => 13,
            ProtocolError::AlreadyProcessed => 14,
            ProtocolError::InvalidInstructionData => 15,
            ProtocolError::UnknownProgram => 16,
        }
    }
}
