//! Delegation Bridge - moves accounts between the base ledger and the ephemeral layer
//!
//! Handles:
//! - Delegating base accounts and seeding their ephemeral snapshots
//! - Landing scheduled commitments on the base ledger
//! - Resolving base finality for commit requests
//! - A client facade that routes requests to the right ledger

pub mod client;
pub mod committer;
pub mod confirmation;
pub mod delegator;
pub mod error;

#[cfg(test)]
mod tests;

pub use client::DelegationClient;
pub use committer::{CommitOutcome, CommitterConfig, RequestOutcome, StateCommitter};
pub use confirmation::{CommitConfirmation, ConfirmationResolver, FinalizedCommit, PollConfig};
pub use delegator::DelegationManager;
pub use error::{BridgeError, BridgeResult};
