//! Persistence Layer for base ledger state
//!
//! Uses sled embedded database to persist accounts and commitment records
//! across restarts. State is saved periodically and on shutdown. The
//! ephemeral layer is not persisted; it re-clones delegated accounts from
//! the base ledger.

use delegation_types::{CommitmentRecord, LedgerAccount};
use serde::{Deserialize, Serialize};
use sled::Db;
use solana_sdk::{clock::Slot, hash::Hash, pubkey::Pubkey};
use std::path::Path;

use crate::base_ledger::BaseLedger;

/// Metadata about the base ledger state
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LedgerMetadata {
    /// Current slot
    pub slot: Slot,
    /// Current blockhash
    pub blockhash: [u8; 32],
    /// Total accounts stored
    pub account_count: u64,
    /// Total commitment records stored
    pub commitment_count: u64,
    /// Last save timestamp
    pub last_save_ts: i64,
}

/// Persistent storage for base ledger state
pub struct PersistentStore {
    /// Sled database instance
    db: Db,
    /// Accounts tree
    accounts: sled::Tree,
    /// Account slots tree (tracks when each account was modified)
    account_slots: sled::Tree,
    /// Commitment records, keyed by record address
    commitments: sled::Tree,
    /// Metadata tree
    metadata: sled::Tree,
}

fn pubkey_from_key(key: &[u8]) -> anyhow::Result<Pubkey> {
    let bytes: [u8; 32] = key
        .try_into()
        .map_err(|_| anyhow::anyhow!("Invalid pubkey length"))?;
    Ok(Pubkey::new_from_array(bytes))
}

impl PersistentStore {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let accounts = db.open_tree("accounts")?;
        let account_slots = db.open_tree("account_slots")?;
        let commitments = db.open_tree("commitments")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened persistent store at {:?}", path.as_ref());

        Ok(Self {
            db,
            accounts,
            account_slots,
            commitments,
            metadata,
        })
    }

    /// Store an account
    pub fn store_account(&self, pubkey: &Pubkey, account: &LedgerAccount, slot: Slot) -> anyhow::Result<()> {
        let account_bytes = bincode::serialize(account)?;
        self.accounts.insert(pubkey.as_ref(), account_bytes)?;
        self.account_slots.insert(pubkey.as_ref(), &slot.to_le_bytes())?;
        Ok(())
    }

    /// Get an account with the slot it was last modified
    pub fn get_account_with_slot(&self, pubkey: &Pubkey) -> anyhow::Result<Option<(LedgerAccount, Slot)>> {
        let account: LedgerAccount = match self.accounts.get(pubkey.as_ref())? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };
        Ok(Some((account, self.account_slot(pubkey.as_ref())?)))
    }

    fn account_slot(&self, key: &[u8]) -> anyhow::Result<Slot> {
        Ok(match self.account_slots.get(key)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().unwrap_or([0u8; 8]);
                Slot::from_le_bytes(arr)
            }
            None => 0,
        })
    }

    /// Get all accounts (for loading into memory)
    pub fn get_all_accounts(&self) -> anyhow::Result<Vec<(Pubkey, LedgerAccount, Slot)>> {
        let mut accounts = Vec::new();

        for result in self.accounts.iter() {
            let (key, value) = result?;
            let pubkey = pubkey_from_key(&key)?;
            let account: LedgerAccount = bincode::deserialize(&value)?;
            let slot = self.account_slot(&key)?;
            accounts.push((pubkey, account, slot));
        }

        Ok(accounts)
    }

    /// Store a commitment record. Records already on disk are left untouched.
    pub fn store_commitment(&self, address: &Pubkey, record: &CommitmentRecord) -> anyhow::Result<bool> {
        let bytes = bincode::serialize(record)?;
        let inserted = self
            .commitments
            .compare_and_swap(address.as_ref(), None as Option<&[u8]>, Some(bytes))?
            .is_ok();
        Ok(inserted)
    }

    pub fn get_all_commitments(&self) -> anyhow::Result<Vec<(Pubkey, CommitmentRecord)>> {
        let mut records = Vec::new();
        for result in self.commitments.iter() {
            let (key, value) = result?;
            records.push((pubkey_from_key(&key)?, bincode::deserialize(&value)?));
        }
        Ok(records)
    }

    /// Save ledger metadata
    pub fn save_metadata(&self, metadata: &LedgerMetadata) -> anyhow::Result<()> {
        let bytes = bincode::serialize(metadata)?;
        self.metadata.insert("ledger", bytes)?;
        Ok(())
    }

    /// Load ledger metadata
    pub fn load_metadata(&self) -> anyhow::Result<Option<LedgerMetadata>> {
        match self.metadata.get("ledger")? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of stored accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn commitment_count(&self) -> usize {
        self.commitments.len()
    }
}

/// Extension trait to add persistence to the base ledger
pub trait LedgerPersistence {
    /// Save accounts, commitment records and the slot clock
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;

    /// Load a previously saved ledger, returns the number of accounts restored
    fn load_from_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;
}

impl LedgerPersistence for BaseLedger {
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        let snapshot = self.snapshot();
        let count = snapshot.accounts.len();

        for (pubkey, account, slot) in &snapshot.accounts {
            store.store_account(pubkey, account, *slot)?;
        }

        for (address, record) in &snapshot.commitments {
            store.store_commitment(address, record)?;
        }

        store.save_metadata(&LedgerMetadata {
            slot: snapshot.slot,
            blockhash: snapshot.blockhash.to_bytes(),
            account_count: count as u64,
            commitment_count: store.commitment_count() as u64,
            last_save_ts: chrono::Utc::now().timestamp(),
        })?;

        store.flush()?;
        tracing::info!("Saved {} accounts to disk", count);

        Ok(count)
    }

    fn load_from_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        let accounts = store.get_all_accounts()?;
        let count = accounts.len();

        for (pubkey, account, slot) in accounts {
            self.account_store().store_account(pubkey, account, slot);
        }

        let records = store.get_all_commitments()?;
        let record_count = records.len();
        for (address, record) in records {
            self.restore_commitment(address, record);
        }

        if let Some(metadata) = store.load_metadata()? {
            self.restore_clock(metadata.slot, Hash::new_from_array(metadata.blockhash));
        }

        tracing::info!(
            "Loaded {} accounts and {} commitment records from disk",
            count,
            record_count
        );

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtin_programs, tests::helpers, BaseLedgerConfig, Ledger, SlotClock};
    use counter_program::{counter_address, Counter};
    use delegation_types::{BaseInstruction, Commitment, SignedTransaction};
    use solana_sdk::{signature::Keypair, signer::Signer};
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
    };
    use tempfile::tempdir;

    #[test]
    fn test_store_and_load_account() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();

        let pubkey = Pubkey::new_unique();
        let account = LedgerAccount::new_owned(Pubkey::new_unique(), 1000, vec![1, 2, 3, 4]);

        store.store_account(&pubkey, &account, 42).unwrap();
        store.flush().unwrap();

        let (loaded, slot) = store.get_account_with_slot(&pubkey).unwrap().unwrap();
        assert_eq!(loaded, account);
        assert_eq!(slot, 42);
    }

    #[test]
    fn test_commitment_records_are_insert_only() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let address = Pubkey::new_unique();

        let record = |seq| CommitmentRecord {
            commitment: delegation_types::Commitment::new(
                Pubkey::new_unique(),
                seq,
                &[0; 8],
                Hash::new_unique(),
                1,
            ),
            identity: Pubkey::new_unique(),
            signature: solana_sdk::signature::Signature::new_unique(),
            base_slot: 3,
            base_blockhash: Hash::new_unique(),
        };

        let first = record(1);
        assert!(store.store_commitment(&address, &first).unwrap());
        assert!(!store.store_commitment(&address, &record(2)).unwrap());

        let records = store.get_all_commitments().unwrap();
        assert_eq!(records, vec![(address, first)]);
    }

    #[test]
    fn test_ledger_survives_restart() {
        let dir = tempdir().unwrap();
        let controller = Keypair::new();
        let validator = Keypair::new();

        let (counter, slot, blockhash) = {
            let ledger = BaseLedger::new(builtin_programs(), BaseLedgerConfig::default());
            let counter = helpers::create_counter(&ledger, &controller);
            helpers::delegate(&ledger, &controller, &counter, &validator);
            ledger.advance_slot();

            let store = PersistentStore::open(dir.path()).unwrap();
            assert_eq!(ledger.save_to_disk(&store).unwrap(), 1);
            (counter, ledger.current_slot(), ledger.latest_blockhash())
        };

        let restored = BaseLedger::new(builtin_programs(), BaseLedgerConfig::default());
        let store = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(restored.load_from_disk(&store).unwrap(), 1);

        assert_eq!(counter, counter_address(&controller.pubkey()));
        assert_eq!(restored.current_slot(), slot);
        assert_eq!(restored.latest_blockhash(), blockhash);
        let record = restored.delegation_record(&counter).unwrap();
        assert_eq!(record.delegated_to, validator.pubkey());

        let metadata = store.load_metadata().unwrap().unwrap();
        assert_eq!(metadata.account_count, 1);
        assert_eq!(metadata.slot, slot);
    }

    #[test]
    fn test_save_during_commits_stays_consistent() {
        let controller = Keypair::new();
        let validator = Keypair::new();
        let ledger = BaseLedger::new(builtin_programs(), BaseLedgerConfig::default());
        let counter = helpers::create_counter(&ledger, &controller);
        helpers::delegate(&ledger, &controller, &counter, &validator);
        let delegation_id = ledger.delegation_record(&counter).unwrap().delegation_id;
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                for seq in 1..=200u64 {
                    let payload = Counter { count: seq * 10 }.to_bytes();
                    let tx = SignedTransaction::new(
                        &validator,
                        vec![BaseInstruction::CommitState {
                            commitment: Commitment::new(counter, seq, &payload, delegation_id, 0),
                            payload,
                        }],
                        ledger.latest_blockhash(),
                    );
                    ledger.submit(&tx).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });

            let mut saves = 0;
            while !done.load(Ordering::SeqCst) || saves == 0 {
                let dir = tempdir().unwrap();
                let store = PersistentStore::open(dir.path()).unwrap();
                ledger.save_to_disk(&store).unwrap();
                saves += 1;

                let restored = BaseLedger::new(builtin_programs(), BaseLedgerConfig::default());
                restored.load_from_disk(&store).unwrap();
                let record = restored.delegation_record(&counter).unwrap();
                let data = restored.account_store().get_account(&counter).unwrap().data;

                // Every saved record is covered by the saved account state
                for saved in restored.commitments_for(&counter) {
                    assert!(saved.commitment.seq <= record.last_commit_seq);
                }
                if record.last_commit_seq > 0 {
                    let last = restored
                        .commitment_record(&counter, &delegation_id, record.last_commit_seq)
                        .unwrap();
                    assert!(last.commitment.matches_payload(&data));
                }
                assert_eq!(
                    restored.commitments_for(&counter).len() as u64,
                    record.last_commit_seq
                );
            }
        });

        assert_eq!(ledger.delegation_record(&counter).unwrap().last_commit_seq, 200);
    }
}
