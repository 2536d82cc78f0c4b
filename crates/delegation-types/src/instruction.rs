//! Ledger Instructions

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::{state::Commitment, DEFAULT_COMMIT_FREQUENCY_MS};

/// Call into an owner program for one account
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Invoke {
    pub program_id: Pubkey,
    pub account: Pubkey,
    /// Program-defined instruction bytes
    pub data: Vec<u8>,
}

impl Invoke {
    pub fn new_with_borsh<T: BorshSerialize>(program_id: Pubkey, account: Pubkey, data: &T) -> Self {
        Self {
            program_id,
            account,
            data: borsh::to_vec(data).expect("instruction serialization should not fail"),
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct DelegateArgs {
    /// The ephemeral layer identity that receives write authority
    pub validator: Pubkey,
    /// Interval between scheduled commits (0 = only on request)
    pub commit_frequency_ms: u64,
}

impl DelegateArgs {
    pub fn new(validator: Pubkey) -> Self {
        Self {
            validator,
            commit_frequency_ms: DEFAULT_COMMIT_FREQUENCY_MS,
        }
    }

    pub fn with_commit_frequency(mut self, commit_frequency_ms: u64) -> Self {
        self.commit_frequency_ms = commit_frequency_ms;
        self
    }
}

/// Instructions accepted by the base ledger
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum BaseInstruction {
    /// Run the owning program against an account it owns.
    /// Rejected while the account is delegated.
    Invoke(Invoke),

    /// Hand write authority for `account` to an ephemeral layer
    ///
    /// Signer: the authority the owning program requires for delegation
    Delegate { account: Pubkey, args: DelegateArgs },

    /// Write committed ephemeral state into the account
    ///
    /// Signer: the ephemeral layer named in the delegation record
    CommitState {
        commitment: Commitment,
        payload: Vec<u8>,
    },

    /// Return write authority to the original owner.
    /// Only valid after a `CommitState` of the same account in the same transaction.
    ///
    /// Signer: the ephemeral layer named in the delegation record
    Undelegate { account: Pubkey },
}

impl BaseInstruction {
    /// The account this instruction writes
    pub fn account(&self) -> Pubkey {
        match self {
            BaseInstruction::Invoke(invoke) => invoke.account,
            BaseInstruction::Delegate { account, .. } => *account,
            BaseInstruction::CommitState { commitment, .. } => commitment.account,
            BaseInstruction::Undelegate { account } => *account,
        }
    }
}

impl From<Invoke> for BaseInstruction {
    fn from(invoke: Invoke) -> Self {
        BaseInstruction::Invoke(invoke)
    }
}

/// Instructions accepted by the ephemeral layer
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum EphemeralInstruction {
    /// Run the owning program against the ephemeral snapshot
    Invoke(Invoke),

    /// Schedule a commit of the current snapshot to the base ledger
    Commit { account: Pubkey },

    /// Schedule a final commit and hand the account back to the base ledger
    Undelegate { account: Pubkey },
}

impl EphemeralInstruction {
    /// The account this instruction touches
    pub fn account(&self) -> Pubkey {
        match self {
            EphemeralInstruction::Invoke(invoke) => invoke.account,
            EphemeralInstruction::Commit { account } => *account,
            EphemeralInstruction::Undelegate { account } => *account,
        }
    }
}

impl From<Invoke> for EphemeralInstruction {
    fn from(invoke: Invoke) -> Self {
        EphemeralInstruction::Invoke(invoke)
    }
}
