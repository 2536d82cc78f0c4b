//! In-memory account storage using DashMap for concurrent access

use dashmap::DashMap;
use delegation_types::LedgerAccount;
use solana_sdk::{clock::Slot, pubkey::Pubkey};
use std::sync::Arc;

/// Thread-safe in-memory account storage
///
/// Uses DashMap for lock-free concurrent reads and fine-grained write locks.
#[derive(Clone)]
pub struct AccountStore {
    /// Main account storage
    accounts: Arc<DashMap<Pubkey, LedgerAccount>>,
    /// Track which slot each account was last modified
    account_slots: Arc<DashMap<Pubkey, Slot>>,
}

impl AccountStore {
    /// Create a new empty account store
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            account_slots: Arc::new(DashMap::new()),
        }
    }

    /// Get an account by pubkey
    pub fn get_account(&self, pubkey: &Pubkey) -> Option<LedgerAccount> {
        self.accounts.get(pubkey).map(|r| r.value().clone())
    }

    /// Get an account with the slot it was last modified
    pub fn get_account_with_slot(&self, pubkey: &Pubkey) -> Option<(LedgerAccount, Slot)> {
        let account = self.accounts.get(pubkey)?;
        let slot = self.account_slots.get(pubkey).map(|s| *s).unwrap_or(0);
        Some((account.value().clone(), slot))
    }

    /// Store an account
    pub fn store_account(&self, pubkey: Pubkey, account: LedgerAccount, slot: Slot) {
        self.accounts.insert(pubkey, account);
        self.account_slots.insert(pubkey, slot);
    }

    /// Check if an account exists
    pub fn account_exists(&self, pubkey: &Pubkey) -> bool {
        self.accounts.contains_key(pubkey)
    }

    /// Get all account pubkeys
    pub fn get_all_pubkeys(&self) -> Vec<Pubkey> {
        self.accounts.iter().map(|r| *r.key()).collect()
    }

    /// Get account count
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Get accounts whose owner-of-record is `program_id`
    pub fn get_program_accounts(&self, program_id: &Pubkey) -> Vec<(Pubkey, LedgerAccount)> {
        self.accounts
            .iter()
            .filter(|r| r.value().owner() == *program_id)
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}
