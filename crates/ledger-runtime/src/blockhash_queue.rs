//! Slot clock and recent blockhash queue
//!
//! Every slot gets a blockhash chained from the previous one. Transactions
//! name one of the recent blockhashes to prove they were built against a
//! recent view of the ledger they target.

use solana_sdk::{
    clock::Slot,
    hash::{hashv, Hash},
};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BlockhashQueue {
    slot: Slot,
    /// Oldest first
    entries: VecDeque<(Slot, Hash)>,
    max_age: usize,
}

impl BlockhashQueue {
    pub fn new(genesis: Hash, max_age: usize) -> Self {
        Self::restore(0, genesis, max_age)
    }

    /// Resume a queue at a persisted slot
    pub fn restore(slot: Slot, blockhash: Hash, max_age: usize) -> Self {
        let mut entries = VecDeque::with_capacity(max_age);
        entries.push_back((slot, blockhash));
        Self {
            slot,
            entries,
            max_age: max_age.max(1),
        }
    }

    pub fn current_slot(&self) -> Slot {
        self.slot
    }

    pub fn latest(&self) -> Hash {
        self.entries
            .back()
            .map(|(_, hash)| *hash)
            .unwrap_or_default()
    }

    pub fn is_valid(&self, blockhash: &Hash) -> bool {
        self.entries.iter().any(|(_, hash)| hash == blockhash)
    }

    /// Slot the blockhash was produced at, if still recent
    pub fn slot_of(&self, blockhash: &Hash) -> Option<Slot> {
        self.entries
            .iter()
            .find(|(_, hash)| hash == blockhash)
            .map(|(slot, _)| *slot)
    }

    /// Produce the next slot and its blockhash
    pub fn advance(&mut self) -> (Slot, Hash) {
        let previous = self.latest();
        self.slot += 1;
        let blockhash = hashv(&[previous.as_ref(), &self.slot.to_le_bytes()]);

        self.entries.push_back((self.slot, blockhash));
        while self.entries.len() > self.max_age {
            self.entries.pop_front();
        }

        (self.slot, blockhash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
