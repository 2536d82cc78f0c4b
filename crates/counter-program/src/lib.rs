//! Counter Program
//!
//! Owns counter accounts on both ledgers. The same code runs against the
//! canonical account on the base ledger and against the snapshot on the
//! ephemeral layer.
//!
//! Account Structure:
//! - Counter: a single `u64`, at a PDA derived from its controller

use delegation_types::{Invocation, OwnerProgram, ProtocolError};
use solana_sdk::pubkey::Pubkey;

pub mod error;
pub mod instruction;
pub mod processor;
pub mod state;

pub use error::CounterError;
pub use instruction::CounterInstruction;
pub use state::Counter;

// Counter Program ID
solana_sdk::declare_id!("Counter111111111111111111111111111111111111");

/// Constants
pub mod constants {
    /// Counter account seed
    pub const COUNTER_SEED: &[u8] = b"counter";
}

/// Address of the counter controlled by `controller`
pub fn counter_address(controller: &Pubkey) -> Pubkey {
    Counter::derive_pda(controller, &id()).0
}

/// The counter program as a ledger builtin
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterProgram;

impl OwnerProgram for CounterProgram {
    fn program_id(&self) -> Pubkey {
        id()
    }

    fn process(&self, invocation: Invocation<'_>) -> Result<(), ProtocolError> {
        processor::process(&id(), invocation).map_err(Into::into)
    }

    /// Only the controller whose key derives the address may delegate it
    fn can_delegate(&self, account: &Pubkey, requester: &Pubkey) -> bool {
        counter_address(requester) == *account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_controller_can_delegate() {
        let controller = Pubkey::new_unique();
        let account = counter_address(&controller);

        assert!(CounterProgram.can_delegate(&account, &controller));
        assert!(!CounterProgram.can_delegate(&account, &Pubkey::new_unique()));
    }
}
