//! Signature status cache
//!
//! Records every landed transaction with the slot it landed in. Used to
//! reject duplicate submissions and to answer confirmation queries.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_sdk::{clock::Slot, signature::Signature};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    /// Applied, may still be rolled back by the ledger's consensus
    Processed,
    /// Cannot be rolled back
    Finalized,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: Slot,
    pub confirmation: Confirmation,
}

impl SignatureStatus {
    pub fn is_finalized(&self) -> bool {
        self.confirmation == Confirmation::Finalized
    }
}

#[derive(Default)]
pub struct StatusCache {
    statuses: DashMap<Signature, SignatureStatus>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.statuses.contains_key(signature)
    }

    pub fn get(&self, signature: &Signature) -> Option<SignatureStatus> {
        self.statuses.get(signature).map(|s| *s)
    }

    pub fn insert(&self, signature: Signature, slot: Slot) {
        self.statuses.insert(
            signature,
            SignatureStatus {
                slot,
                confirmation: Confirmation::Processed,
            },
        );
    }

    /// Mark everything landed at or before `slot` as finalized
    pub fn finalize_through(&self, slot: Slot) -> usize {
        let mut finalized = 0;
        for mut entry in self.statuses.iter_mut() {
            let status = entry.value_mut();
            if status.confirmation == Confirmation::Processed && status.slot <= slot {
                status.confirmation = Confirmation::Finalized;
                finalized += 1;
            }
        }
        finalized
    }

    /// Drop statuses older than `slot`. Their blockhashes have expired, so
    /// the transactions can no longer be resubmitted.
    pub fn prune_before(&self, slot: Slot) {
        self.statuses.retain(|_, status| status.slot >= slot);
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
