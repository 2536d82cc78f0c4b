//! Account State
//!
//! An account's write authority is an explicit tag: either the owning
//! program holds it, or the delegation program holds it on behalf of an
//! ephemeral layer. The delegation record lives inside the tag, so an
//! account can never carry a record without being delegated.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    clock::Slot,
    hash::{hash, hashv, Hash},
    pubkey::Pubkey,
    signature::Signature,
};
use std::{fmt, str::FromStr};

use crate::ids::delegation_program;

/// The Delegation Record
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DelegationRecord {
    /// The program that owned the account before delegation
    pub owner_before: Pubkey,

    /// The ephemeral layer identity holding write authority
    pub delegated_to: Pubkey,

    /// The base slot at which the delegation landed
    pub delegation_slot: Slot,

    /// Identifies this delegation cycle, derived from the delegating transaction
    pub delegation_id: Hash,

    /// Sequence number of the last accepted commitment
    pub last_commit_seq: u64,

    /// Payload written by the last accepted commitment
    pub last_committed_snapshot: Vec<u8>,

    /// The state update frequency in milliseconds
    pub commit_frequency_ms: u64,
}

impl DelegationRecord {
    /// Cycle id for a delegation of `account` landed by transaction `signature`
    pub fn derive_id(account: &Pubkey, signature: &[u8]) -> Hash {
        hashv(&[account.as_ref(), signature])
    }
}

/// Who may write an account on the base ledger
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum AccountAuthority {
    /// The owning program mutates the account directly
    Owned { by: Pubkey },
    /// The delegation program holds the account for an ephemeral layer
    Delegated { record: DelegationRecord },
}

impl AccountAuthority {
    /// Owner-of-record
    pub fn owner(&self) -> Pubkey {
        match self {
            AccountAuthority::Owned { by } => *by,
            AccountAuthority::Delegated { .. } => delegation_program::id(),
        }
    }

    pub fn delegation_record(&self) -> Option<&DelegationRecord> {
        match self {
            AccountAuthority::Owned { .. } => None,
            AccountAuthority::Delegated { record } => Some(record),
        }
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self, AccountAuthority::Delegated { .. })
    }
}

/// An account held by the base ledger
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LedgerAccount {
    /// Native balance
    pub lamports: u64,
    /// Application payload, laid out by the owning program
    pub data: Vec<u8>,
    /// Current write authority
    pub authority: AccountAuthority,
}

impl LedgerAccount {
    /// Create an account owned by `owner`
    pub fn new_owned(owner: Pubkey, lamports: u64, data: Vec<u8>) -> Self {
        Self {
            lamports,
            data,
            authority: AccountAuthority::Owned { by: owner },
        }
    }

    /// Owner-of-record
    pub fn owner(&self) -> Pubkey {
        self.authority.owner()
    }

    /// Ephemeral layer holding this account, empty when not delegated
    pub fn delegated_to(&self) -> Option<Pubkey> {
        self.authority
            .delegation_record()
            .map(|record| record.delegated_to)
    }

    pub fn delegation_record(&self) -> Option<&DelegationRecord> {
        self.authority.delegation_record()
    }

    pub fn is_delegated(&self) -> bool {
        self.authority.is_delegated()
    }
}

/// A flush of ephemeral state, produced by the ephemeral layer
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    /// The account for which the state is committed
    pub account: Pubkey,
    /// Must advance past the record's `last_commit_seq`
    pub seq: u64,
    /// Hash of the committed payload
    pub payload_hash: Hash,
    /// Delegation cycle this commitment belongs to
    pub delegation_id: Hash,
    /// Ephemeral slot at which the snapshot was read
    pub ephemeral_slot: Slot,
}

impl Commitment {
    pub fn new(
        account: Pubkey,
        seq: u64,
        payload: &[u8],
        delegation_id: Hash,
        ephemeral_slot: Slot,
    ) -> Self {
        Self {
            account,
            seq,
            payload_hash: hash(payload),
            delegation_id,
            ephemeral_slot,
        }
    }

    pub fn matches_payload(&self, payload: &[u8]) -> bool {
        self.payload_hash == hash(payload)
    }
}

/// A commitment accepted by the base ledger. Never modified once written.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommitmentRecord {
    pub commitment: Commitment,
    /// The identity that submitted the commitment
    pub identity: Pubkey,
    /// Base transaction that landed the commitment
    pub signature: Signature,
    /// Base slot the commitment landed in
    pub base_slot: Slot,
    /// Base blockhash current when the commitment landed
    pub base_blockhash: Hash,
}

/// Which of the two ledgers a request targets
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Base,
    Ephemeral,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Base => write!(f, "base"),
            LedgerKind::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

impl FromStr for LedgerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(LedgerKind::Base),
            "ephemeral" | "eel" => Ok(LedgerKind::Ephemeral),
            other => Err(format!("unknown ledger: {}", other)),
        }
    }
}

/// An account as one ledger currently sees it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccountView {
    pub address: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
    /// Owner-of-record on that ledger
    pub owner: Pubkey,
    pub delegated: bool,
    /// Slot at which the account was last written on that ledger
    pub slot: Slot,
    pub ledger: LedgerKind,
}
