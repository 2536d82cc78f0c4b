//! Ledger Runtime - the two ledgers of the delegation model
//!
//! This crate provides:
//! - The base ledger: durable, canonical account store with finality
//! - The ephemeral execution layer: fast snapshots of delegated accounts
//! - Slot production for both ledgers
//! - Sled persistence for the base ledger

pub mod account_store;
pub mod base_ledger;
pub mod blockhash_queue;
pub mod ephemeral;
pub mod ledger;
pub mod persistence;
pub mod slot_producer;
pub mod status_cache;

#[cfg(test)]
mod tests;

pub use account_store::AccountStore;
pub use base_ledger::{BaseLedger, BaseLedgerConfig, LedgerSnapshot};
pub use blockhash_queue::BlockhashQueue;
pub use ephemeral::{EphemeralLedger, EphemeralSnapshot, ScheduledCommit, SnapshotStatus};
pub use ledger::{AccountSource, Ledger, SlotClock, SlotUpdate};
pub use persistence::{LedgerMetadata, LedgerPersistence, PersistentStore};
pub use slot_producer::{SlotProducer, SlotProducerConfig};
pub use status_cache::{Confirmation, SignatureStatus, StatusCache};

use counter_program::CounterProgram;
use delegation_types::ProgramRegistry;
use std::sync::Arc;

/// Base ledger slot time in milliseconds
pub const BASE_SLOT_TIME_MS: u64 = 400;

/// Ephemeral layer slot time in milliseconds
pub const EPHEMERAL_SLOT_TIME_MS: u64 = 50;

/// Slots produced on top of a base slot before it is final
pub const DEFAULT_FINALITY_DEPTH: u64 = 2;

/// Programs both ledgers run by default
pub fn builtin_programs() -> ProgramRegistry {
    ProgramRegistry::new().with_program(Arc::new(CounterProgram))
}
