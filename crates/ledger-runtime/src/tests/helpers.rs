//! Shared setup for ledger tests

use counter_program::{counter_address, instruction, Counter};
use delegation_types::{BaseInstruction, DelegateArgs, SignedTransaction};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
};
use std::sync::Arc;

use crate::{builtin_programs, BaseLedger, BaseLedgerConfig, EphemeralLedger, Ledger};

/// Base ledger plus an ephemeral layer run by `validator`
pub fn setup() -> (Arc<BaseLedger>, EphemeralLedger, Keypair) {
    let base = Arc::new(BaseLedger::new(builtin_programs(), BaseLedgerConfig::default()));
    let validator = Keypair::new();
    let eel = EphemeralLedger::new(validator.pubkey(), base.clone(), builtin_programs());
    (base, eel, validator)
}

/// Initialize the counter controlled by `controller` on the base ledger
pub fn create_counter(ledger: &BaseLedger, controller: &Keypair) -> Pubkey {
    let counter = counter_address(&controller.pubkey());
    ledger
        .apply_write(controller, instruction::initialize(counter))
        .unwrap();
    counter
}

/// Delegate `counter` to `validator` with periodic commits disabled
pub fn delegate(
    ledger: &BaseLedger,
    controller: &Keypair,
    counter: &Pubkey,
    validator: &Keypair,
) -> Signature {
    let tx = SignedTransaction::new(
        controller,
        vec![BaseInstruction::Delegate {
            account: *counter,
            args: DelegateArgs::new(validator.pubkey()).with_commit_frequency(0),
        }],
        ledger.latest_blockhash(),
    );
    ledger.submit(&tx).unwrap()
}

pub fn count(data: &[u8]) -> u64 {
    Counter::from_bytes(data).unwrap().count
}

pub fn count_on<L: Ledger>(ledger: &L, account: &Pubkey) -> u64 {
    count(&ledger.fetch_account(account).unwrap().data)
}
