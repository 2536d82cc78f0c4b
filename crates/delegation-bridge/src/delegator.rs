//! Delegation Manager - hands base accounts to the ephemeral layer
//!
//! The delegate transition lands as a single base transaction; the snapshot
//! is seeded from the resulting delegation record right after.

use delegation_types::{BaseInstruction, DelegateArgs, DelegationRecord, SignedTransaction};
use ledger_runtime::{BaseLedger, EphemeralLedger, Ledger};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::sync::Arc;

use crate::error::BridgeResult;

pub struct DelegationManager {
    base: Arc<BaseLedger>,
    eel: Arc<EphemeralLedger>,
}

impl DelegationManager {
    pub fn new(base: Arc<BaseLedger>, eel: Arc<EphemeralLedger>) -> Self {
        Self { base, eel }
    }

    /// Delegate `account` to this ephemeral layer.
    ///
    /// `requester` must hold the authority the owning program requires.
    /// Delegating an account that is already delegated fails with
    /// `AlreadyDelegated` and changes nothing.
    pub fn delegate(
        &self,
        account: &Pubkey,
        requester: &Keypair,
        commit_frequency_ms: u64,
    ) -> BridgeResult<Signature> {
        let transaction = SignedTransaction::new(
            requester,
            vec![BaseInstruction::Delegate {
                account: *account,
                args: DelegateArgs::new(self.eel.identity()).with_commit_frequency(commit_frequency_ms),
            }],
            self.base.latest_blockhash(),
        );
        let signature = self.base.submit(&transaction)?;

        // The ephemeral layer can still clone lazily if seeding fails here
        if let Err(err) = self.eel.seed_snapshot(account) {
            tracing::warn!("Seeding {} after delegation failed: {}", account, err);
        }

        Ok(signature)
    }

    /// Check if an account is delegated to our ephemeral layer
    pub fn is_delegated(&self, account: &Pubkey) -> bool {
        self.delegation_record(account)
            .map(|record| record.delegated_to == self.eel.identity())
            .unwrap_or(false)
    }

    pub fn delegation_record(&self, account: &Pubkey) -> Option<DelegationRecord> {
        self.base.delegation_record(account)
    }

    /// Seed snapshots for every account the base ledger shows delegated to
    /// this layer. Used when the ephemeral layer starts.
    pub fn restore_delegations(&self) -> usize {
        let accounts = self.base.delegated_to(&self.eel.identity());
        let mut restored = 0;
        for account in &accounts {
            match self.eel.seed_snapshot(account) {
                Ok(()) => restored += 1,
                Err(err) => tracing::warn!("Could not restore delegation of {}: {}", account, err),
            }
        }
        if restored > 0 {
            tracing::info!("Restored {} delegated accounts into the ephemeral layer", restored);
        }
        restored
    }
}
