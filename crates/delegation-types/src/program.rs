//! Owner-program interface
//!
//! Both ledgers run the same program code: the base ledger against the
//! canonical account, the ephemeral layer against its snapshot.

use solana_sdk::pubkey::Pubkey;
use std::{collections::HashMap, sync::Arc};

use crate::error::ProtocolError;

/// One account handed to a program for one instruction
pub struct Invocation<'a> {
    /// The account being written
    pub account: Pubkey,
    /// The transaction signer
    pub signer: Pubkey,
    /// Account payload, `None` when the account does not exist yet
    pub data: &'a mut Option<Vec<u8>>,
    /// Program-defined instruction bytes
    pub instruction: &'a [u8],
}

/// An application program that owns accounts
pub trait OwnerProgram: Send + Sync {
    /// Program identity, part of every address it derives
    fn program_id(&self) -> Pubkey;

    /// Execute one instruction against one account
    fn process(&self, invocation: Invocation<'_>) -> Result<(), ProtocolError>;

    /// Whether `requester` may hand `account` to an ephemeral layer
    fn can_delegate(&self, account: &Pubkey, requester: &Pubkey) -> bool;
}

/// Programs a ledger can execute, keyed by program id
#[derive(Clone, Default)]
pub struct ProgramRegistry {
    programs: HashMap<Pubkey, Arc<dyn OwnerProgram>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: Arc<dyn OwnerProgram>) -> Self {
        self.register(program);
        self
    }

    pub fn register(&mut self, program: Arc<dyn OwnerProgram>) {
        self.programs.insert(program.program_id(), program);
    }

    pub fn get(&self, program_id: &Pubkey) -> Result<&Arc<dyn OwnerProgram>, ProtocolError> {
        self.programs
            .get(program_id)
            .ok_or(ProtocolError::UnknownProgram)
    }
}
