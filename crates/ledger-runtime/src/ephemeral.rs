//! Ephemeral Execution Layer
//!
//! Holds working snapshots of accounts delegated to this layer's identity and
//! executes owner-program writes against them. The layer never writes the base
//! ledger: commits are queued as [`ScheduledCommit`]s for the bridge to land.
//!
//! Snapshots are seeded from the base ledger's delegation record, either
//! eagerly by the delegation manager or lazily on first access.

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::{mapref::entry::Entry as SnapshotEntry, DashMap};
use delegation_types::{
    AccountView, Commitment, EphemeralInstruction, Invocation, Invoke, LedgerKind,
    ProgramRegistry, ProtocolError, SignedTransaction, MAX_RECENT_BLOCKHASHES,
};
use parking_lot::{Mutex, RwLock};
use solana_sdk::{
    clock::Slot,
    hash::{hashv, Hash},
    pubkey::Pubkey,
    signature::Signature,
};
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    blockhash_queue::BlockhashQueue,
    ledger::{AccountSource, Ledger, SlotClock, SlotUpdate},
    status_cache::{SignatureStatus, StatusCache},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Active,
    /// A final commit is in flight; the snapshot is frozen
    Undelegating,
}

/// Working copy of one delegated account
#[derive(Debug, Clone)]
pub struct EphemeralSnapshot {
    pub owner_program: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
    /// Writes applied since this delegation was seeded
    pub seq: u64,
    pub delegation_id: Hash,
    /// Seq given to the most recently scheduled commitment
    pub last_scheduled_commit_seq: u64,
    /// Seq of the most recent commitment known to have landed on the base ledger
    pub last_landed_commit_seq: u64,
    pub commit_frequency_ms: u64,
    /// Written since the last scheduled commit
    pub dirty: bool,
    pub last_commit_at: Instant,
    /// Ephemeral slot of the last write
    pub slot: Slot,
    pub status: SnapshotStatus,
}

impl EphemeralSnapshot {
    fn is_due(&self, now: Instant) -> bool {
        self.dirty
            && self.commit_frequency_ms > 0
            && self.status == SnapshotStatus::Active
            && now.saturating_duration_since(self.last_commit_at)
                >= Duration::from_millis(self.commit_frequency_ms)
    }
}

/// A commitment waiting to be landed on the base ledger
#[derive(Debug, Clone)]
pub struct ScheduledCommit {
    /// Ephemeral transaction that asked for the commit, `None` when periodic
    pub request: Option<Signature>,
    /// Commitments scheduled by the same request, this one included
    pub request_commits: usize,
    pub commitment: Commitment,
    pub payload: Vec<u8>,
    /// Hand the account back once the commitment lands
    pub undelegate: bool,
}

pub struct EphemeralLedger {
    identity: Pubkey,
    base: Arc<dyn AccountSource>,
    snapshots: DashMap<Pubkey, EphemeralSnapshot>,
    programs: ProgramRegistry,
    clock: RwLock<BlockhashQueue>,
    status_cache: StatusCache,
    commit_sender: Sender<ScheduledCommit>,
    commit_receiver: Receiver<ScheduledCommit>,
    /// Serializes transaction processing
    write_lock: Mutex<()>,
}

impl EphemeralLedger {
    pub fn new(identity: Pubkey, base: Arc<dyn AccountSource>, programs: ProgramRegistry) -> Self {
        let (commit_sender, commit_receiver) = unbounded();
        let genesis = hashv(&[b"ephemeral-ledger-genesis".as_ref(), identity.as_ref()]);

        Self {
            identity,
            base,
            snapshots: DashMap::new(),
            programs,
            clock: RwLock::new(BlockhashQueue::new(genesis, MAX_RECENT_BLOCKHASHES)),
            status_cache: StatusCache::new(),
            commit_sender,
            commit_receiver,
            write_lock: Mutex::new(()),
        }
    }

    /// The validator identity accounts are delegated to
    pub fn identity(&self) -> Pubkey {
        self.identity
    }

    /// Queue of commitments for the bridge to land
    pub fn scheduled_commits(&self) -> Receiver<ScheduledCommit> {
        self.commit_receiver.clone()
    }

    pub fn snapshot(&self, address: &Pubkey) -> Option<EphemeralSnapshot> {
        self.snapshots.get(address).map(|s| s.value().clone())
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Clone a delegated account from the base ledger.
    ///
    /// No-op when a snapshot of the same delegation cycle already exists, so
    /// local writes are never overwritten by older base state.
    pub fn seed_snapshot(&self, address: &Pubkey) -> Result<(), ProtocolError> {
        let _guard = self.write_lock.lock();
        self.seed_snapshot_locked(address)
    }

    /// Called with the write lock held
    fn seed_snapshot_locked(&self, address: &Pubkey) -> Result<(), ProtocolError> {
        let account = self
            .base
            .load_account(address)
            .ok_or(ProtocolError::AccountNotInitialized)?;
        let record = account
            .delegation_record()
            .ok_or(ProtocolError::NotDelegated)?;
        if record.delegated_to != self.identity {
            return Err(ProtocolError::UnauthorizedWriter);
        }

        let slot = self.clock.read().current_slot();
        match self.snapshots.entry(*address) {
            SnapshotEntry::Occupied(existing)
                if existing.get().delegation_id == record.delegation_id =>
            {
                return Ok(());
            }
            entry => {
                entry.insert(EphemeralSnapshot {
                    owner_program: record.owner_before,
                    lamports: account.lamports,
                    data: record.last_committed_snapshot.clone(),
                    seq: 0,
                    delegation_id: record.delegation_id,
                    last_scheduled_commit_seq: record.last_commit_seq,
                    last_landed_commit_seq: record.last_commit_seq,
                    commit_frequency_ms: record.commit_frequency_ms,
                    dirty: false,
                    last_commit_at: Instant::now(),
                    slot,
                    status: SnapshotStatus::Active,
                });
            }
        }

        info!(
            "Cloned {} into ephemeral layer (commit seq {})",
            address, record.last_commit_seq
        );
        Ok(())
    }

    /// Called with the write lock held
    fn load_snapshot(&self, address: &Pubkey) -> Result<EphemeralSnapshot, ProtocolError> {
        if let Some(snapshot) = self.snapshot(address) {
            return Ok(snapshot);
        }
        self.seed_snapshot_locked(address)?;
        self.snapshot(address).ok_or(ProtocolError::NotDelegated)
    }

    fn process_invoke(
        &self,
        snapshot: &mut EphemeralSnapshot,
        signer: Pubkey,
        invoke: &Invoke,
        slot: Slot,
    ) -> Result<(), ProtocolError> {
        if snapshot.status == SnapshotStatus::Undelegating {
            return Err(ProtocolError::UndelegationPending);
        }
        if invoke.program_id != snapshot.owner_program {
            return Err(ProtocolError::UnauthorizedWriter);
        }

        let program = self.programs.get(&invoke.program_id)?;
        let mut data = Some(snapshot.data.clone());
        program.process(Invocation {
            account: invoke.account,
            signer,
            data: &mut data,
            instruction: &invoke.data,
        })?;

        if let Some(data) = data {
            snapshot.data = data;
        }
        snapshot.seq += 1;
        snapshot.dirty = true;
        snapshot.slot = slot;
        Ok(())
    }

    /// Assign the next commitment seq and freeze the payload to commit
    fn prepare_commit(
        snapshot: &mut EphemeralSnapshot,
        address: Pubkey,
        slot: Slot,
        undelegate: bool,
    ) -> Result<(Commitment, Vec<u8>), ProtocolError> {
        if snapshot.status == SnapshotStatus::Undelegating {
            return Err(ProtocolError::UndelegationPending);
        }

        let seq = snapshot.last_scheduled_commit_seq + 1;
        let commitment = Commitment::new(address, seq, &snapshot.data, snapshot.delegation_id, slot);

        snapshot.last_scheduled_commit_seq = seq;
        snapshot.dirty = false;
        snapshot.last_commit_at = Instant::now();
        if undelegate {
            snapshot.status = SnapshotStatus::Undelegating;
        }

        Ok((commitment, snapshot.data.clone()))
    }

    fn enqueue(&self, scheduled: ScheduledCommit) {
        debug!(
            "Scheduled commit {} of {} (undelegate: {})",
            scheduled.commitment.seq, scheduled.commitment.account, scheduled.undelegate
        );
        if let Err(err) = self.commit_sender.send(scheduled) {
            error!("Commit queue closed: {}", err);
        }
    }

    /// Schedule a commit outside of a transaction (periodic commits)
    pub fn schedule_commit(
        &self,
        address: &Pubkey,
        undelegate: bool,
    ) -> Result<Commitment, ProtocolError> {
        let _guard = self.write_lock.lock();
        let slot = self.clock.read().current_slot();

        let mut snapshot = self
            .snapshots
            .get_mut(address)
            .ok_or(ProtocolError::NotDelegated)?;
        let (commitment, payload) = Self::prepare_commit(&mut snapshot, *address, slot, undelegate)?;
        drop(snapshot);

        self.enqueue(ScheduledCommit {
            request: None,
            request_commits: 1,
            commitment: commitment.clone(),
            payload,
            undelegate,
        });
        Ok(commitment)
    }

    /// Schedule a commit for every snapshot whose commit interval elapsed with unsaved writes
    pub fn schedule_due_commits(&self, now: Instant) -> Vec<Commitment> {
        let due: Vec<Pubkey> = self
            .snapshots
            .iter()
            .filter(|s| s.value().is_due(now))
            .map(|s| *s.key())
            .collect();

        due.iter()
            .filter_map(|address| match self.schedule_commit(address, false) {
                Ok(commitment) => Some(commitment),
                Err(err) => {
                    debug!("Skipped periodic commit of {}: {}", address, err);
                    None
                }
            })
            .collect()
    }

    /// Record that commitment `seq` landed on the base ledger
    pub fn mark_committed(&self, address: &Pubkey, delegation_id: &Hash, seq: u64) {
        let _guard = self.write_lock.lock();
        if let Some(mut snapshot) = self.snapshots.get_mut(address) {
            if snapshot.delegation_id == *delegation_id && seq > snapshot.last_landed_commit_seq {
                snapshot.last_landed_commit_seq = seq;
            }
        }
    }

    /// Drop the snapshot once its undelegation landed on the base ledger
    pub fn release(&self, address: &Pubkey, delegation_id: &Hash) -> bool {
        let _guard = self.write_lock.lock();
        let released = self
            .snapshots
            .remove_if(address, |_, snapshot| {
                snapshot.delegation_id == *delegation_id
                    && snapshot.status == SnapshotStatus::Undelegating
            })
            .is_some();
        if released {
            info!("Released {} back to the base ledger", address);
        }
        released
    }

    /// The base ledger rejected a commitment of this snapshot; keep it due
    /// for the next periodic commit
    pub fn mark_uncommitted(&self, address: &Pubkey, delegation_id: &Hash) {
        let _guard = self.write_lock.lock();
        if let Some(mut snapshot) = self.snapshots.get_mut(address) {
            if snapshot.delegation_id == *delegation_id {
                snapshot.dirty = true;
            }
        }
    }

    /// Lift the freeze after the base ledger rejected an undelegation
    pub fn abort_undelegation(&self, address: &Pubkey, delegation_id: &Hash) {
        let _guard = self.write_lock.lock();
        if let Some(mut snapshot) = self.snapshots.get_mut(address) {
            if snapshot.delegation_id == *delegation_id
                && snapshot.status == SnapshotStatus::Undelegating
            {
                snapshot.status = SnapshotStatus::Active;
                warn!("Undelegation of {} aborted, snapshot writable again", address);
            }
        }
    }
}

impl Ledger for EphemeralLedger {
    type Instruction = EphemeralInstruction;

    fn submit(
        &self,
        transaction: &SignedTransaction<EphemeralInstruction>,
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

        let slot = {
            let clock = self.clock.read();
            if !clock.is_valid(&transaction.message.recent_blockhash) {
                return Err(ProtocolError::BlockhashNotFound);
            }
            clock.current_slot()
        };

        let mut staged: HashMap<Pubkey, EphemeralSnapshot> = HashMap::new();
        let mut scheduled = Vec::new();

        for instruction in transaction.instructions() {
            let address = instruction.account();
            let snapshot = match staged.entry(address) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let snapshot = self.load_snapshot(&address).map_err(|err| match instruction {
                        EphemeralInstruction::Invoke(_) => ProtocolError::UnauthorizedWriter,
                        _ => err,
                    });
                    match snapshot {
                        Ok(snapshot) => entry.insert(snapshot),
                        Err(err) => {
                            warn!("Ephemeral transaction {} rejected: {}", signature, err);
                            return Err(err);
                        }
                    }
                }
            };

            let result = match instruction {
                EphemeralInstruction::Invoke(invoke) => {
                    self.process_invoke(snapshot, *transaction.signer(), invoke, slot)
                }
                EphemeralInstruction::Commit { account } => {
                    Self::prepare_commit(snapshot, *account, slot, false).map(|(commitment, payload)| {
                        scheduled.push((commitment, payload, false));
                    })
                }
                EphemeralInstruction::Undelegate { account } => {
                    Self::prepare_commit(snapshot, *account, slot, true).map(|(commitment, payload)| {
                        scheduled.push((commitment, payload, true));
                    })
                }
            };

            if let Err(err) = result {
                warn!(
                    "Ephemeral transaction {} rejected at {}: {}",
                    signature, address, err
                );
                return Err(err);
            }
        }

        for (address, snapshot) in staged {
            self.snapshots.insert(address, snapshot);
        }
        let request_commits = scheduled.len();
        for (commitment, payload, undelegate) in scheduled {
            self.enqueue(ScheduledCommit {
                request: Some(signature),
                request_commits,
                commitment,
                payload,
                undelegate,
            });
        }
        self.status_cache.insert(signature, slot);

        debug!("Ephemeral transaction {} processed at slot {}", signature, slot);
        Ok(signature)
    }

    /// Only accounts delegated to this layer are visible here
    fn fetch_account(&self, address: &Pubkey) -> Option<AccountView> {
        let snapshot = self.snapshots.get(address)?;
        Some(AccountView {
            address: *address,
            lamports: snapshot.lamports,
            data: snapshot.data.clone(),
            owner: snapshot.owner_program,
            delegated: true,
            slot: snapshot.slot,
            ledger: LedgerKind::Ephemeral,
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

impl SlotClock for EphemeralLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Ephemeral
    }

    /// Ephemeral slots are final as soon as the next slot opens
    fn advance_slot(&self) -> SlotUpdate {
        let (slot, blockhash) = {
            let _guard = self.write_lock.lock();
            self.clock.write().advance()
        };

        let finalized_slot = slot.checked_sub(1);
        let newly_finalized = finalized_slot
            .map(|finalized| self.status_cache.finalize_through(finalized))
            .unwrap_or(0);
        self.status_cache
            .prune_before(slot.saturating_sub(2 * MAX_RECENT_BLOCKHASHES as u64));

        SlotUpdate {
            ledger: LedgerKind::Ephemeral,
            slot,
            blockhash,
            finalized_slot,
            newly_finalized,
        }
    }
}
