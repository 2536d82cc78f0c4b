//! Counter Program State

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::{constants::COUNTER_SEED, error::CounterError};

/// Counter account payload
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
}

impl Counter {
    /// Account size
    pub const LEN: usize = 8;

    /// Derive PDA for the counter of `controller`
    pub fn derive_pda(controller: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[COUNTER_SEED, controller.as_ref()], program_id)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CounterError> {
        Self::try_from_slice(data).map_err(|_| CounterError::NotInitialized)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("Counter serialization should not fail")
    }
}
