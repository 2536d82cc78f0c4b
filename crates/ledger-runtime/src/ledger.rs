//! Traits shared by the base ledger and the ephemeral layer

use borsh::BorshSerialize;
use delegation_types::{
    AccountView, Invoke, LedgerAccount, LedgerKind, ProtocolError, SignedTransaction,
};
use serde::Serialize;
use solana_sdk::{
    clock::Slot,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};

use crate::status_cache::SignatureStatus;

/// Emitted every time a ledger produces a slot
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SlotUpdate {
    pub ledger: LedgerKind,
    pub slot: Slot,
    pub blockhash: Hash,
    /// Highest slot that can no longer be rolled back
    pub finalized_slot: Option<Slot>,
    /// Transactions that became final with this slot
    pub newly_finalized: usize,
}

/// Something that advances in slots
pub trait SlotClock: Send + Sync {
    fn kind(&self) -> LedgerKind;

    /// Close the current slot and open the next one
    fn advance_slot(&self) -> SlotUpdate;
}

/// Read access to canonical base ledger accounts, including their delegation records
pub trait AccountSource: Send + Sync {
    fn load_account(&self, address: &Pubkey) -> Option<LedgerAccount>;
}

/// A ledger that accepts signed transactions
pub trait Ledger: SlotClock {
    type Instruction: BorshSerialize + From<Invoke>;

    /// Verify and apply a transaction. All instructions apply or none do.
    fn submit(
        &self,
        transaction: &SignedTransaction<Self::Instruction>,
    ) -> Result<Signature, ProtocolError>;

    /// The account as this ledger currently sees it
    fn fetch_account(&self, address: &Pubkey) -> Option<AccountView>;

    fn latest_blockhash(&self) -> Hash;

    fn current_slot(&self) -> Slot;

    fn signature_status(&self, signature: &Signature) -> Option<SignatureStatus>;

    /// Sign and submit a single program call
    fn apply_write(&self, payer: &Keypair, invoke: Invoke) -> Result<Signature, ProtocolError> {
        let transaction =
            SignedTransaction::new(payer, vec![invoke.into()], self.latest_blockhash());
        self.submit(&transaction)
    }
}
