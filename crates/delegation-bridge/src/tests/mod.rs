//! Bridge tests against in-process ledgers


use counter_program::{counter_address, instruction, Counter};
use delegation_types::LedgerKind;
use ledger_runtime::{builtin_programs, BaseLedger, BaseLedgerConfig, EphemeralLedger, SlotClock};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::sync::Arc;

use crate::{CommitterConfig, DelegationClient, PollConfig, StateCommitter};

/// Base ledger, one ephemeral layer and the bridge between them
pub struct Harness {
    pub base: Arc<BaseLedger>,
    pub eel: Arc<EphemeralLedger>,
    pub validator: Arc<Keypair>,
    pub committer: Arc<StateCommitter>,
    pub client: DelegationClient,
}

impl Harness {
    pub fn new() -> Self {
        let validator = Arc::new(Keypair::new());
        Self::with_committer_key(validator.clone(), validator)
    }

    /// Committer signing with `committer_key` for a layer run by `validator`
    pub fn with_committer_key(validator: Arc<Keypair>, committer_key: Arc<Keypair>) -> Self {
        let base = Arc::new(BaseLedger::new(builtin_programs(), BaseLedgerConfig::default()));
        let eel = Arc::new(EphemeralLedger::new(
            validator.pubkey(),
            base.clone(),
            builtin_programs(),
        ));
        let committer = Arc::new(StateCommitter::new(
            committer_key,
            base.clone(),
            eel.clone(),
            CommitterConfig { poll_interval_ms: 2 },
        ));
        let client = DelegationClient::new(
            base.clone(),
            eel.clone(),
            committer.clone(),
            PollConfig {
                initial_backoff_ms: 2,
                max_backoff_ms: 20,
                max_attempts: 200,
            },
        );

        Self {
            base,
            eel,
            validator,
            committer,
            client,
        }
    }

    /// Initialize the counter controlled by `controller` through the client
    pub fn create_counter(&self, controller: &Keypair) -> Pubkey {
        let counter = counter_address(&controller.pubkey());
        let (ledger, _) = self
            .client
            .write(controller, instruction::initialize(counter))
            .unwrap();
        assert_eq!(ledger, LedgerKind::Base);
        counter
    }

    /// Land every queued commit and make it final on the base ledger
    pub fn settle(&self) {
        self.committer.drain();
        for _ in 0..self.base.config().finality_depth {
            self.base.advance_slot();
        }
    }

    pub fn count(&self, ledger: LedgerKind, counter: &Pubkey) -> u64 {
        let view = self.client.fetch_account(ledger, counter).unwrap();
        Counter::from_bytes(&view.data).unwrap().count
    }
}
