//! Bridge Errors

use delegation_types::ProtocolError;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Commit {seq} of {account} rejected by the base ledger: {error}")]
    CommitRejected {
        account: Pubkey,
        seq: u64,
        error: ProtocolError,
    },

    #[error("Commit confirmation for {request} not final after {attempts} attempts")]
    ConfirmationTimeout { request: Signature, attempts: u32 },

    #[error("No commit was requested by {0}")]
    UnknownRequest(Signature),
}

impl BridgeError {
    /// Underlying ledger rejection, if any
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            BridgeError::Protocol(err) => Some(*err),
            BridgeError::CommitRejected { error, .. } => Some(*error),
            _ => None,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
