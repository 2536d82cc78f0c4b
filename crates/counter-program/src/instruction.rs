//! Counter Program Instructions

use borsh::{BorshDeserialize, BorshSerialize};
use delegation_types::Invoke;
use solana_sdk::pubkey::Pubkey;

/// Counter program instructions
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum CounterInstruction {
    /// Create the counter at 0
    ///
    /// Account: the counter PDA of the signer
    Initialize,

    /// Add one
    Increment,

    /// Subtract one
    Decrement,

    /// Add `amount`
    IncrementBy { amount: u64 },
}

pub fn initialize(counter: Pubkey) -> Invoke {
    Invoke::new_with_borsh(crate::id(), counter, &CounterInstruction::Initialize)
}

pub fn increment(counter: Pubkey) -> Invoke {
    Invoke::new_with_borsh(crate::id(), counter, &CounterInstruction::Increment)
}

pub fn decrement(counter: Pubkey) -> Invoke {
    Invoke::new_with_borsh(crate::id(), counter, &CounterInstruction::Decrement)
}

pub fn increment_by(counter: Pubkey, amount: u64) -> Invoke {
    Invoke::new_with_borsh(crate::id(), counter, &CounterInstruction::IncrementBy { amount })
}
