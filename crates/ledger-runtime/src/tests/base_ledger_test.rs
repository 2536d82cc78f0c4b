//! Base ledger tests
//!
//! Covers:
//! - Owner writes and the delegation lock
//! - Delegation authority checks
//! - Commitment acceptance, ordering and cycle binding
//! - Undelegation requiring a final commit in the same transaction
//! - Transaction atomicity, blockhash markers and duplicate rejection
//! - Finality tracking

use counter_program::{instruction, Counter};
use delegation_types::{
    delegation_program, BaseInstruction, Commitment, DelegateArgs, Invoke, LedgerKind,
    ProtocolError, SignedTransaction,
};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
};

use super::helpers::{count, count_on, create_counter, delegate, setup};
use crate::{BaseLedger, Confirmation, Ledger, SlotClock};

fn commit_tx(
    ledger: &BaseLedger,
    signer: &Keypair,
    counter: &Pubkey,
    seq: u64,
    value: u64,
    undelegate: bool,
) -> SignedTransaction<BaseInstruction> {
    let record = ledger.delegation_record(counter).unwrap();
    let payload = Counter { count: value }.to_bytes();
    let commitment = Commitment::new(*counter, seq, &payload, record.delegation_id, 9);

    let mut instructions = vec![BaseInstruction::CommitState {
        commitment,
        payload,
    }];
    if undelegate {
        instructions.push(BaseInstruction::Undelegate { account: *counter });
    }
    SignedTransaction::new(signer, instructions, ledger.latest_blockhash())
}

fn submit_commit(
    ledger: &BaseLedger,
    signer: &Keypair,
    counter: &Pubkey,
    seq: u64,
    value: u64,
    undelegate: bool,
) -> Result<Signature, ProtocolError> {
    ledger.submit(&commit_tx(ledger, signer, counter, seq, value, undelegate))
}

#[test]
fn test_owner_writes_on_base() {
    let (base, _, _) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    base.apply_write(&controller, instruction::increment(counter))
        .unwrap();

    let view = base.fetch_account(&counter).unwrap();
    assert_eq!(count(&view.data), 1);
    assert_eq!(view.owner, counter_program::id());
    assert!(!view.delegated);
    assert_eq!(view.ledger, LedgerKind::Base);
}

#[test]
fn test_write_to_missing_counter_fails() {
    let (base, _, _) = setup();
    let payer = Keypair::new();

    let err = base
        .apply_write(&payer, instruction::increment(Pubkey::new_unique()))
        .unwrap_err();
    assert_eq!(err, ProtocolError::AccountNotInitialized);
}

#[test]
fn test_delegate_locks_base_writes() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    delegate(&base, &controller, &counter, &validator);

    let view = base.fetch_account(&counter).unwrap();
    assert_eq!(view.owner, delegation_program::id());
    assert!(view.delegated);

    let record = base.delegation_record(&counter).unwrap();
    assert_eq!(record.owner_before, counter_program::id());
    assert_eq!(record.delegated_to, validator.pubkey());
    assert_eq!(record.last_commit_seq, 0);
    assert_eq!(record.last_committed_snapshot, view.data);
    assert_eq!(base.delegated_to(&validator.pubkey()), vec![counter]);

    let err = base
        .apply_write(&controller, instruction::increment(counter))
        .unwrap_err();
    assert_eq!(err, ProtocolError::UnauthorizedWriter);
    assert_eq!(count_on(base.as_ref(), &counter), 0);
}

#[test]
fn test_delegate_rejections() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    // Only the controller may delegate its counter
    let stranger = Keypair::new();
    let tx = SignedTransaction::new(
        &stranger,
        vec![BaseInstruction::Delegate {
            account: counter,
            args: DelegateArgs::new(validator.pubkey()),
        }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&tx), Err(ProtocolError::InvalidAuthority));

    // Missing account
    let missing = SignedTransaction::new(
        &controller,
        vec![BaseInstruction::Delegate {
            account: Pubkey::new_unique(),
            args: DelegateArgs::new(validator.pubkey()),
        }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&missing), Err(ProtocolError::AccountNotInitialized));

    // Already delegated
    delegate(&base, &controller, &counter, &validator);
    let again = SignedTransaction::new(
        &controller,
        vec![BaseInstruction::Delegate {
            account: counter,
            args: DelegateArgs::new(Keypair::new().pubkey()),
        }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&again), Err(ProtocolError::AlreadyDelegated));
    assert_eq!(
        base.delegation_record(&counter).unwrap().delegated_to,
        validator.pubkey()
    );
}

#[test]
fn test_commitment_lands_and_advances_seq() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);
    delegate(&base, &controller, &counter, &validator);

    submit_commit(&base, &validator, &counter, 1, 5, false).unwrap();

    let record = base.delegation_record(&counter).unwrap();
    assert_eq!(record.last_commit_seq, 1);
    assert_eq!(count(&record.last_committed_snapshot), 5);
    assert_eq!(count_on(base.as_ref(), &counter), 5);

    let stored = base
        .commitment_record(&counter, &record.delegation_id, 1)
        .unwrap();
    assert_eq!(stored.identity, validator.pubkey());
    assert_eq!(stored.base_slot, base.current_slot());
    assert!(stored.commitment.matches_payload(&Counter { count: 5 }.to_bytes()));
    assert_eq!(base.commitments_for(&counter).len(), 1);
}

#[test]
fn test_stale_and_replayed_commitments_are_rejected() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);
    delegate(&base, &controller, &counter, &validator);

    submit_commit(&base, &validator, &counter, 2, 7, false).unwrap();

    assert_eq!(
        submit_commit(&base, &validator, &counter, 1, 3, false),
        Err(ProtocolError::StaleCommit {
            submitted: 1,
            last: 2
        })
    );

    base.advance_slot();
    assert_eq!(
        submit_commit(&base, &validator, &counter, 2, 7, false),
        Err(ProtocolError::StaleCommit {
            submitted: 2,
            last: 2
        })
    );

    assert_eq!(count_on(base.as_ref(), &counter), 7);
    assert_eq!(base.commitments_for(&counter).len(), 1);
}

#[test]
fn test_commitment_checks() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    // Not delegated yet
    let payload = Counter { count: 1 }.to_bytes();
    let undelegated = SignedTransaction::new(
        &validator,
        vec![BaseInstruction::CommitState {
            commitment: Commitment::new(counter, 1, &payload, Hash::default(), 0),
            payload: payload.clone(),
        }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&undelegated), Err(ProtocolError::NotDelegated));

    delegate(&base, &controller, &counter, &validator);
    let record = base.delegation_record(&counter).unwrap();

    // Signed by someone other than the delegated validator
    assert_eq!(
        submit_commit(&base, &Keypair::new(), &counter, 1, 1, false),
        Err(ProtocolError::InvalidAuthority)
    );

    // Payload does not match its hash
    let mismatched = SignedTransaction::new(
        &validator,
        vec![BaseInstruction::CommitState {
            commitment: Commitment::new(counter, 1, &payload, record.delegation_id, 0),
            payload: Counter { count: 2 }.to_bytes(),
        }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&mismatched), Err(ProtocolError::InvalidCommitment));

    // Belongs to another delegation cycle
    let foreign = SignedTransaction::new(
        &validator,
        vec![BaseInstruction::CommitState {
            commitment: Commitment::new(counter, 1, &payload, Hash::new_unique(), 0),
            payload,
        }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&foreign), Err(ProtocolError::InvalidCommitment));

    assert_eq!(base.delegation_record(&counter).unwrap().last_commit_seq, 0);
}

#[test]
fn test_undelegate_requires_final_commit() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);
    delegate(&base, &controller, &counter, &validator);

    let bare = SignedTransaction::new(
        &validator,
        vec![BaseInstruction::Undelegate { account: counter }],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&bare), Err(ProtocolError::MissingFinalCommit));
    assert!(base.fetch_account(&counter).unwrap().delegated);

    submit_commit(&base, &validator, &counter, 1, 4, true).unwrap();

    let view = base.fetch_account(&counter).unwrap();
    assert!(!view.delegated);
    assert_eq!(view.owner, counter_program::id());
    assert_eq!(count(&view.data), 4);
    assert!(base.delegation_record(&counter).is_none());

    // Owner writes resume on top of the committed state
    base.apply_write(&controller, instruction::increment(counter))
        .unwrap();
    assert_eq!(count_on(base.as_ref(), &counter), 5);
}

#[test]
fn test_failed_instruction_rolls_back_transaction() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);
    delegate(&base, &controller, &counter, &validator);
    let record = base.delegation_record(&counter).unwrap();

    let payload = Counter { count: 3 }.to_bytes();
    let tx = SignedTransaction::new(
        &validator,
        vec![
            BaseInstruction::CommitState {
                commitment: Commitment::new(counter, 1, &payload, record.delegation_id, 0),
                payload,
            },
            BaseInstruction::Undelegate {
                account: Pubkey::new_unique(),
            },
        ],
        base.latest_blockhash(),
    );
    assert_eq!(base.submit(&tx), Err(ProtocolError::AccountNotInitialized));

    assert_eq!(base.delegation_record(&counter).unwrap().last_commit_seq, 0);
    assert_eq!(count_on(base.as_ref(), &counter), 0);
    assert!(base.commitments_for(&counter).is_empty());
    assert!(base.signature_status(&tx.signature()).is_none());
}

#[test]
fn test_redelegation_starts_new_cycle() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    delegate(&base, &controller, &counter, &validator);
    let first_cycle = base.delegation_record(&counter).unwrap();
    let old_commit = commit_tx(&base, &validator, &counter, 5, 50, false);
    submit_commit(&base, &validator, &counter, 1, 1, true).unwrap();

    base.advance_slot();
    delegate(&base, &controller, &counter, &validator);
    let second_cycle = base.delegation_record(&counter).unwrap();
    assert_ne!(first_cycle.delegation_id, second_cycle.delegation_id);
    assert_eq!(second_cycle.last_commit_seq, 0);

    // A commitment prepared in the first cycle cannot land in the second
    assert_eq!(base.submit(&old_commit), Err(ProtocolError::InvalidCommitment));
    assert_eq!(count_on(base.as_ref(), &counter), 1);
}

#[test]
fn test_transaction_markers() {
    let (base, _, _) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    // Unknown blockhash
    let stale = SignedTransaction::new(
        &controller,
        vec![BaseInstruction::from(instruction::increment(counter))],
        Hash::new_unique(),
    );
    assert_eq!(base.submit(&stale), Err(ProtocolError::BlockhashNotFound));

    // Duplicate submission
    let tx = SignedTransaction::new(
        &controller,
        vec![BaseInstruction::from(instruction::increment(counter))],
        base.latest_blockhash(),
    );
    base.submit(&tx).unwrap();
    assert_eq!(base.submit(&tx), Err(ProtocolError::AlreadyProcessed));
    assert_eq!(count_on(base.as_ref(), &counter), 1);

    // Tampered
    let mut tampered = SignedTransaction::new(
        &controller,
        vec![BaseInstruction::from(instruction::increment(counter))],
        base.latest_blockhash(),
    );
    tampered.message.instructions.push(BaseInstruction::Invoke(Invoke {
        program_id: counter_program::id(),
        account: counter,
        data: vec![1],
    }));
    assert_eq!(base.submit(&tampered), Err(ProtocolError::InvalidSignature));

    // Empty
    let empty = SignedTransaction::<BaseInstruction>::new(&controller, vec![], base.latest_blockhash());
    assert_eq!(base.submit(&empty), Err(ProtocolError::InvalidInstructionData));
}

#[test]
fn test_finality_depth() {
    let (base, _, _) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);

    let signature = base
        .apply_write(&controller, instruction::increment(counter))
        .unwrap();
    let status = base.signature_status(&signature).unwrap();
    assert_eq!(status.confirmation, Confirmation::Processed);
    assert_eq!(status.slot, 0);

    let update = base.advance_slot();
    assert_eq!(update.slot, 1);
    assert_eq!(update.finalized_slot, None);
    assert!(!base.signature_status(&signature).unwrap().is_finalized());

    let update = base.advance_slot();
    assert_eq!(update.finalized_slot, Some(0));
    assert_eq!(update.newly_finalized, 2);
    assert!(base.signature_status(&signature).unwrap().is_finalized());
    assert_eq!(base.finalized_slot(), Some(0));
}

#[test]
fn test_blockhash_expires_after_queue_rotation() {
    let (base, _, _) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);
    let old = base.latest_blockhash();

    for _ in 0..delegation_types::MAX_RECENT_BLOCKHASHES {
        base.advance_slot();
    }

    let tx = SignedTransaction::new(
        &controller,
        vec![BaseInstruction::from(instruction::increment(counter))],
        old,
    );
    assert_eq!(base.submit(&tx), Err(ProtocolError::BlockhashNotFound));
}

#[test]
fn test_commitment_seq_with_existing_record_is_rejected() {
    let (base, _, validator) = setup();
    let controller = Keypair::new();
    let counter = create_counter(&base, &controller);
    delegate(&base, &controller, &counter, &validator);

    // Accounts captured before the commit, records after it
    let before = base.snapshot();
    submit_commit(&base, &validator, &counter, 1, 5, false).unwrap();
    let after = base.snapshot();

    let restored = BaseLedger::new(crate::builtin_programs(), Default::default());
    for (address, account, slot) in before.accounts {
        restored.account_store().store_account(address, account, slot);
    }
    for (address, record) in after.commitments {
        restored.restore_commitment(address, record);
    }
    restored.restore_clock(after.slot, after.blockhash);
    assert_eq!(restored.delegation_record(&counter).unwrap().last_commit_seq, 0);

    assert_eq!(
        submit_commit(&restored, &validator, &counter, 1, 7, false),
        Err(ProtocolError::InvalidCommitment)
    );
    assert_eq!(count_on(&restored, &counter), 0);

    let record = restored.delegation_record(&counter).unwrap();
    let stored = restored
        .commitment_record(&counter, &record.delegation_id, 1)
        .unwrap();
    assert!(stored.commitment.matches_payload(&Counter { count: 5 }.to_bytes()));

    // The next seq is still open
    submit_commit(&restored, &validator, &counter, 2, 7, false).unwrap();
    assert_eq!(count_on(&restored, &counter), 7);
}
