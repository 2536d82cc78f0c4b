//! Shared types for delegation between the base ledger and the ephemeral layer
//!
//! Both ledgers and the bridge between them speak these types:
//! - Deterministic addresses for delegation records and commitments
//! - Account state tagged with its current write authority
//! - Base and ephemeral instructions, wrapped in signed transactions
//! - The owner-program interface shared by both ledgers

pub mod error;
pub mod ids;
pub mod instruction;
pub mod pda;
pub mod program;
pub mod state;
pub mod transaction;

pub use error::ProtocolError;
pub use ids::delegation_program;
pub use instruction::{BaseInstruction, DelegateArgs, EphemeralInstruction, Invoke};
pub use program::{Invocation, OwnerProgram, ProgramRegistry};
pub use state::{
    AccountAuthority, AccountView, Commitment, CommitmentRecord, DelegationRecord, LedgerAccount,
    LedgerKind,
};
pub use transaction::{Message, SignedTransaction};

/// Default interval between scheduled commits (matches the delegate default of the SDKs)
pub const DEFAULT_COMMIT_FREQUENCY_MS: u64 = 30_000;

/// Number of recent blockhashes a ledger accepts as sequencing markers
pub const MAX_RECENT_BLOCKHASHES: usize = 150;
