//! Counter Program Errors

use delegation_types::ProtocolError;
use thiserror::Error;

/// Counter program errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterError {
    #[error("Counter not initialized")]
    NotInitialized,

    #[error("Counter already initialized")]
    AlreadyInitialized,

    #[error("Counter address does not belong to the signer")]
    InvalidAddress,

    #[error("Amount must be greater than 0")]
    InvalidAmount,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Invalid instruction data")]
    InvalidInstructionData,
}

impl From<CounterError> for ProtocolError {
    fn from(e: CounterError) -> Self {
        match e {
            CounterError::NotInitialized => ProtocolError::AccountNotInitialized,
            CounterError::AlreadyInitialized => ProtocolError::AccountAlreadyInitialized,
            CounterError::InvalidAddress => ProtocolError::InvalidAuthority,
            CounterError::InvalidAmount => ProtocolError::InvalidAmount,
            CounterError::Overflow => ProtocolError::ArithmeticOverflow,
            CounterError::InvalidInstructionData => ProtocolError::InvalidInstructionData,
        }
    }
}
