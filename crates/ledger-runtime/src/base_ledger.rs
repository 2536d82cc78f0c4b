//! Base Ledger
//!
//! The durable, canonical account store. Owner programs write the accounts
//! they own here; delegated accounts only change through commitments signed
//! by the ephemeral layer named in their delegation record.

use dashmap::DashMap;
use delegation_types::{
    pda::commit_record_pda_from_delegated_account, AccountAuthority, AccountView,
    BaseInstruction, Commitment, CommitmentRecord, DelegateArgs, DelegationRecord, Invocation,
    Invoke, LedgerAccount, LedgerKind, ProgramRegistry, ProtocolError, SignedTransaction,
    MAX_RECENT_BLOCKHASHES,
};
use parking_lot::{Mutex, RwLock};
use solana_sdk::{
    clock::Slot,
    hash::{hash, Hash},
    pubkey::Pubkey,
    signature::Signature,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::{
    account_store::AccountStore,
    blockhash_queue::BlockhashQueue,
    ledger::{AccountSource, Ledger, SlotClock, SlotUpdate},
    status_cache::{SignatureStatus, StatusCache},
    DEFAULT_FINALITY_DEPTH,
};

#[derive(Debug, Clone)]
pub struct BaseLedgerConfig {
    /// Slots produced on top of a slot before it is final
    pub finality_depth: u64,
    /// Balance given to accounts created by a program
    pub new_account_lamports: u64,
}

impl Default for BaseLedgerConfig {
    fn default() -> Self {
        Self {
            finality_depth: DEFAULT_FINALITY_DEPTH,
            new_account_lamports: 1_000_000,
        }
    }
}

/// What the instructions of one transaction see and produce before it lands
#[derive(Default)]
struct WorkingSet {
    /// `None` for addresses that do not exist yet
    accounts: HashMap<Pubkey, Option<LedgerAccount>>,
    commitments: Vec<(Pubkey, CommitmentRecord)>,
    /// Accounts that received a `CommitState` earlier in this transaction
    committed: HashSet<Pubkey>,
}

impl WorkingSet {
    fn account_mut(&mut self, store: &AccountStore, address: &Pubkey) -> &mut Option<LedgerAccount> {
        self.accounts
            .entry(*address)
            .or_insert_with(|| store.get_account(address))
    }
}

/// Ledger state captured between two transactions
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub accounts: Vec<(Pubkey, LedgerAccount, Slot)>,
    pub commitments: Vec<(Pubkey, CommitmentRecord)>,
    pub slot: Slot,
    pub blockhash: Hash,
}

/// Per-transaction facts instructions are processed against
struct TransactionContext {
    signer: Pubkey,
    signature: Signature,
    slot: Slot,
    blockhash: Hash,
}

pub struct BaseLedger {
    accounts: AccountStore,
    /// Commitment records keyed by their derived address
    commitments: DashMap<Pubkey, CommitmentRecord>,
    programs: ProgramRegistry,
    clock: RwLock<BlockhashQueue>,
    status_cache: StatusCache,
    config: BaseLedgerConfig,
    /// Serializes transaction processing
    write_lock: Mutex<()>,
}

impl BaseLedger {
    pub fn new(programs: ProgramRegistry, config: BaseLedgerConfig) -> Self {
        Self {
            accounts: AccountStore::new(),
            commitments: DashMap::new(),
            programs,
            clock: RwLock::new(BlockhashQueue::new(
                hash(b"base-ledger-genesis"),
                MAX_RECENT_BLOCKHASHES,
            )),
            status_cache: StatusCache::new(),
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BaseLedgerConfig {
        &self.config
    }

    pub fn account_store(&self) -> &AccountStore {
        &self.accounts
    }

    /// Delegation record of `address`, if it is currently delegated
    pub fn delegation_record(&self, address: &Pubkey) -> Option<DelegationRecord> {
        self.accounts
            .get_account(address)
            .and_then(|account| account.delegation_record().cloned())
    }

    /// Accounts currently delegated to `validator`
    pub fn delegated_to(&self, validator: &Pubkey) -> Vec<Pubkey> {
        self.accounts
            .get_program_accounts(&delegation_types::delegation_program::id())
            .into_iter()
            .filter(|(_, account)| account.delegated_to() == Some(*validator))
            .map(|(address, _)| address)
            .collect()
    }

    pub fn commitment_record(
        &self,
        account: &Pubkey,
        delegation_id: &Hash,
        seq: u64,
    ) -> Option<CommitmentRecord> {
        let address = commit_record_pda_from_delegated_account(account, delegation_id, seq);
        self.commitments.get(&address).map(|r| r.value().clone())
    }

    /// All commitment records of an account, ordered by landing slot then seq
    pub fn commitments_for(&self, account: &Pubkey) -> Vec<CommitmentRecord> {
        let mut records: Vec<CommitmentRecord> = self
            .commitments
            .iter()
            .filter(|r| r.value().commitment.account == *account)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| (r.base_slot, r.commitment.seq));
        records
    }

    pub fn commitment_records(&self) -> Vec<(Pubkey, CommitmentRecord)> {
        self.commitments
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }

    /// Copy of every account and commitment record, taken under the write
    /// lock so no transaction is half visible in it
    pub fn snapshot(&self) -> LedgerSnapshot {
        let _guard = self.write_lock.lock();
        let accounts = self
            .accounts
            .get_all_pubkeys()
            .into_iter()
            .filter_map(|address| {
                self.accounts
                    .get_account_with_slot(&address)
                    .map(|(account, slot)| (address, account, slot))
            })
            .collect();
        let clock = self.clock.read();

        LedgerSnapshot {
            accounts,
            commitments: self.commitment_records(),
            slot: clock.current_slot(),
            blockhash: clock.latest(),
        }
    }

    /// Insert a persisted record. Existing records are never replaced.
    pub fn restore_commitment(&self, address: Pubkey, record: CommitmentRecord) {
        self.commitments.entry(address).or_insert(record);
    }

    /// Resume the slot clock at a persisted position
    pub fn restore_clock(&self, slot: Slot, blockhash: Hash) {
        *self.clock.write() = BlockhashQueue::restore(slot, blockhash, MAX_RECENT_BLOCKHASHES);
    }

    /// Highest slot that can no longer be rolled back
    pub fn finalized_slot(&self) -> Option<Slot> {
        self.clock
            .read()
            .current_slot()
            .checked_sub(self.config.finality_depth)
    }

    fn process_instruction(
        &self,
        working: &mut WorkingSet,
        context: &TransactionContext,
        instruction: &BaseInstruction,
    ) -> Result<(), ProtocolError> {
        match instruction {
            BaseInstruction::Invoke(invoke) => self.process_invoke(working, context, invoke),
            BaseInstruction::Delegate { account, args } => {
                self.process_delegate(working, context, account, args)
            }
            BaseInstruction::CommitState {
                commitment,
                payload,
            } => self.process_commit_state(working, context, commitment, payload),
            BaseInstruction::Undelegate { account } => {
                self.process_undelegate(working, context, account)
            }
        }
    }

    fn process_invoke(
        &self,
        working: &mut WorkingSet,
        context: &TransactionContext,
        invoke: &Invoke,
    ) -> Result<(), ProtocolError> {
        let entry = working.account_mut(&self.accounts, &invoke.account);

        if let Some(account) = entry.as_ref() {
            match &account.authority {
                AccountAuthority::Delegated { .. } => return Err(ProtocolError::UnauthorizedWriter),
                AccountAuthority::Owned { by } if *by != invoke.program_id => {
                    return Err(ProtocolError::UnauthorizedWriter)
                }
                AccountAuthority::Owned { .. } => {}
            }
        }

        let program = self.programs.get(&invoke.program_id)?;
        let mut data = entry.as_ref().map(|account| account.data.clone());
        program.process(Invocation {
            account: invoke.account,
            signer: context.signer,
            data: &mut data,
            instruction: &invoke.data,
        })?;

        let Some(data) = data else {
            return Ok(());
        };
        match entry.as_mut() {
            Some(account) => account.data = data,
            None => {
                *entry = Some(LedgerAccount::new_owned(
                    invoke.program_id,
                    self.config.new_account_lamports,
                    data,
                ))
            }
        }

        Ok(())
    }

    fn process_delegate(
        &self,
        working: &mut WorkingSet,
        context: &TransactionContext,
        address: &Pubkey,
        args: &DelegateArgs,
    ) -> Result<(), ProtocolError> {
        let account = working
            .account_mut(&self.accounts, address)
            .as_mut()
            .ok_or(ProtocolError::AccountNotInitialized)?;

        let owner_before = match &account.authority {
            AccountAuthority::Delegated { .. } => return Err(ProtocolError::AlreadyDelegated),
            AccountAuthority::Owned { by } => *by,
        };

        let program = self.programs.get(&owner_before)?;
        if !program.can_delegate(address, &context.signer) {
            return Err(ProtocolError::InvalidAuthority);
        }

        account.authority = AccountAuthority::Delegated {
            record: DelegationRecord {
                owner_before,
                delegated_to: args.validator,
                delegation_slot: context.slot,
                delegation_id: DelegationRecord::derive_id(address, context.signature.as_ref()),
                last_commit_seq: 0,
                last_committed_snapshot: account.data.clone(),
                commit_frequency_ms: args.commit_frequency_ms,
            },
        };

        Ok(())
    }

    fn process_commit_state(
        &self,
        working: &mut WorkingSet,
        context: &TransactionContext,
        commitment: &Commitment,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        let account = working
            .account_mut(&self.accounts, &commitment.account)
            .as_mut()
            .ok_or(ProtocolError::AccountNotInitialized)?;

        let record = match &mut account.authority {
            AccountAuthority::Delegated { record } => record,
            AccountAuthority::Owned { .. } => return Err(ProtocolError::NotDelegated),
        };

        if record.delegated_to != context.signer {
            return Err(ProtocolError::InvalidAuthority);
        }
        if commitment.delegation_id != record.delegation_id {
            return Err(ProtocolError::InvalidCommitment);
        }
        if commitment.seq <= record.last_commit_seq {
            return Err(ProtocolError::StaleCommit {
                submitted: commitment.seq,
                last: record.last_commit_seq,
            });
        }
        if !commitment.matches_payload(payload) {
            return Err(ProtocolError::InvalidCommitment);
        }

        let address = commit_record_pda_from_delegated_account(
            &commitment.account,
            &commitment.delegation_id,
            commitment.seq,
        );
        // A record is never replaced, so its seq can never land twice
        if self.commitments.contains_key(&address) {
            return Err(ProtocolError::InvalidCommitment);
        }

        record.last_commit_seq = commitment.seq;
        record.last_committed_snapshot = payload.to_vec();
        account.data = payload.to_vec();

        working.commitments.push((
            address,
            CommitmentRecord {
                commitment: commitment.clone(),
                identity: context.signer,
                signature: context.signature,
                base_slot: context.slot,
                base_blockhash: context.blockhash,
            },
        ));
        working.committed.insert(commitment.account);

        Ok(())
    }

    fn process_undelegate(
        &self,
        working: &mut WorkingSet,
        context: &TransactionContext,
        address: &Pubkey,
    ) -> Result<(), ProtocolError> {
        let committed = working.committed.contains(address);
        let account = working
            .account_mut(&self.accounts, address)
            .as_mut()
            .ok_or(ProtocolError::AccountNotInitialized)?;

        let owner_before = match &account.authority {
            AccountAuthority::Delegated { record } => {
                if record.delegated_to != context.signer {
                    return Err(ProtocolError::InvalidAuthority);
                }
                record.owner_before
            }
            AccountAuthority::Owned { .. } => return Err(ProtocolError::NotDelegated),
        };

        if !committed {
            return Err(ProtocolError::MissingFinalCommit);
        }

        account.authority = AccountAuthority::Owned { by: owner_before };
        Ok(())
    }

    /// Make a working set visible. Called with the write lock held.
    fn apply(&self, working: WorkingSet, slot: Slot) {
        for (address, account) in working.accounts {
            if let Some(account) = account {
                self.accounts.store_account(address, account, slot);
            }
        }
        for (address, record) in working.commitments {
            self.commitments.entry(address).or_insert(record);
        }
    }
}

impl Ledger for BaseLedger {
    type Instruction = BaseInstruction;

    fn submit(
        &self,
        transaction: &SignedTransaction<BaseInstruction>,
    ) -> Result<Signature, ProtocolError> {
        transaction.verify()?;
        if transaction.instructions().is_empty() {
            return Err(ProtocolError::InvalidInstructionData);
        }

        let signature = transaction.signature();
        let _guard = self.write_lock.lock();

        if self.status_cache.contains(&signature) {
            return Err(ProtocolError::AlreadyProcessed);
        }

        let context = {
            let clock = self.clock.read();
            if !clock.is_valid(&transaction.message.recent_blockhash) {
                return Err(ProtocolError::BlockhashNotFound);
            }
            TransactionContext {
                signer: *transaction.signer(),
                signature,
                slot: clock.current_slot(),
                blockhash: clock.latest(),
            }
        };

        let mut working = WorkingSet::default();
        for instruction in transaction.instructions() {
            if let Err(err) = self.process_instruction(&mut working, &context, instruction) {
                warn!(
                    "Base transaction {} rejected at {}: {}",
                    signature,
                    instruction.account(),
                    err
                );
                return Err(err);
            }
        }

        for instruction in transaction.instructions() {
            match instruction {
                BaseInstruction::Delegate { account, args } => info!(
                    "Delegated {} to {} at slot {}",
                    account, args.validator, context.slot
                ),
                BaseInstruction::CommitState { commitment, .. } => info!(
                    "Commitment {} of {} landed at slot {}",
                    commitment.seq, commitment.account, context.slot
                ),
                BaseInstruction::Undelegate { account } => {
                    info!("Undelegated {} at slot {}", account, context.slot)
                }
                BaseInstruction::Invoke(invoke) => {
                    debug!("Invoked {} on {}", invoke.program_id, invoke.account)
                }
            }
        }

        self.apply(working, context.slot);
        self.status_cache.insert(signature, context.slot);

        Ok(signature)
    }

    fn fetch_account(&self, address: &Pubkey) -> Option<AccountView> {
        let (account, slot) = self.accounts.get_account_with_slot(address)?;
        Some(AccountView {
            address: *address,
            lamports: account.lamports,
            owner: account.owner(),
            delegated: account.is_delegated(),
            data: account.data,
            slot,
            ledger: LedgerKind::Base,
        })
    }

    fn latest_blockhash(&self) -> Hash {
        self.clock.read().latest()
    }

    fn current_slot(&self) -> Slot {
        self.clock.read().current_slot()
    }

    fn signature_status(&self, signature: &Signature) -> Option<SignatureStatus> {
        self.status_cache.get(signature)
    }
}

impl SlotClock for BaseLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Base
    }

    fn advance_slot(&self) -> SlotUpdate {
        let (slot, blockhash) = {
            let _guard = self.write_lock.lock();
            self.clock.write().advance()
        };

        let finalized_slot = slot.checked_sub(self.config.finality_depth);
        let newly_finalized = finalized_slot
            .map(|finalized| self.status_cache.finalize_through(finalized))
            .unwrap_or(0);
        self.status_cache
            .prune_before(slot.saturating_sub(2 * MAX_RECENT_BLOCKHASHES as u64));

        SlotUpdate {
            ledger: LedgerKind::Base,
            slot,
            blockhash,
            finalized_slot,
            newly_finalized,
        }
    }
}

impl AccountSource for BaseLedger {
    fn load_account(&self, address: &Pubkey) -> Option<LedgerAccount> {
        self.accounts.get_account(address)
    }
}
