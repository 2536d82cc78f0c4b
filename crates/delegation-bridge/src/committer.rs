//! State Committer - lands ephemeral commitments on the base ledger
//!
//! Drains the ephemeral layer's commit queue in order, signs each commitment
//! with the validator keypair and submits it to the base ledger. Undelegating
//! commitments carry the `Undelegate` instruction in the same transaction.

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use delegation_types::{
    BaseInstruction, Commitment, ProtocolError, SignedTransaction, MAX_RECENT_BLOCKHASHES,
};
use ledger_runtime::{BaseLedger, EphemeralLedger, Ledger, ScheduledCommit};
use serde::Serialize;
use solana_sdk::{
    clock::Slot,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

#[derive(Debug, Clone)]
pub struct CommitterConfig {
    /// How often the queue is drained and periodic commits are scheduled
    pub poll_interval_ms: u64,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 25,
        }
    }
}

/// What happened to a commit request on the base ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommitOutcome {
    Landed {
        account: Pubkey,
        seq: u64,
        base_signature: Signature,
    },
    Rejected {
        account: Pubkey,
        seq: u64,
        error: ProtocolError,
    },
}

impl CommitOutcome {
    fn key(&self) -> (Pubkey, u64) {
        match *self {
            CommitOutcome::Landed { account, seq, .. }
            | CommitOutcome::Rejected { account, seq, .. } => (account, seq),
        }
    }
}

/// Outcomes of every commitment scheduled by one ephemeral request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    /// Commitments the request scheduled
    pub expected: usize,
    /// One entry per commitment handled so far, in queue order
    pub outcomes: Vec<CommitOutcome>,
    /// Ephemeral slot the request was processed in
    pub ephemeral_slot: Slot,
}

impl RequestOutcome {
    pub fn is_complete(&self) -> bool {
        self.outcomes.len() >= self.expected
    }

    /// First commitment of the request the base ledger refused
    pub fn rejection(&self) -> Option<CommitOutcome> {
        self.outcomes
            .iter()
            .copied()
            .find(|outcome| matches!(outcome, CommitOutcome::Rejected { .. }))
    }

    /// A retried commitment replaces its earlier outcome
    fn record(&mut self, outcome: CommitOutcome) {
        match self.outcomes.iter_mut().find(|o| o.key() == outcome.key()) {
            Some(existing) => *existing = outcome,
            None => self.outcomes.push(outcome),
        }
    }
}

pub struct StateCommitter {
    /// Validator keypair for signing commits
    validator_keypair: Arc<Keypair>,
    base: Arc<BaseLedger>,
    eel: Arc<EphemeralLedger>,
    queue: Receiver<ScheduledCommit>,
    /// Outcomes keyed by the ephemeral request signature
    outcomes: DashMap<Signature, RequestOutcome>,
    config: CommitterConfig,
    /// Set until stopped
    running: Arc<AtomicBool>,
    landed: AtomicU64,
    rejected: AtomicU64,
}

impl StateCommitter {
    pub fn new(
        validator_keypair: Arc<Keypair>,
        base: Arc<BaseLedger>,
        eel: Arc<EphemeralLedger>,
        config: CommitterConfig,
    ) -> Self {
        if validator_keypair.pubkey() != eel.identity() {
            tracing::warn!(
                "Committer keypair {} does not match ephemeral identity {}, commits will be rejected",
                validator_keypair.pubkey(),
                eel.identity()
            );
        }

        Self {
            queue: eel.scheduled_commits(),
            validator_keypair,
            base,
            eel,
            outcomes: DashMap::new(),
            config,
            running: Arc::new(AtomicBool::new(true)),
            landed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Get validator public key
    pub fn validator_pubkey(&self) -> Pubkey {
        self.validator_keypair.pubkey()
    }

    /// Outcomes of the commits requested by an ephemeral transaction
    pub fn outcome(&self, request: &Signature) -> Option<RequestOutcome> {
        self.outcomes.get(request).map(|o| o.value().clone())
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Forget outcomes of requests the ephemeral layer no longer tracks a
    /// status for, returns how many were dropped
    pub fn prune_outcomes(&self) -> usize {
        let horizon = self
            .eel
            .current_slot()
            .saturating_sub(2 * MAX_RECENT_BLOCKHASHES as u64);
        let before = self.outcomes.len();
        self.outcomes.retain(|_, outcome| outcome.ephemeral_slot >= horizon);
        before.saturating_sub(self.outcomes.len())
    }

    pub fn landed_count(&self) -> u64 {
        self.landed.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Land every queued commitment in order, returns how many were handled
    pub fn drain(&self) -> usize {
        let mut handled = 0;
        while let Ok(scheduled) = self.queue.try_recv() {
            let _ = self.process_scheduled(scheduled);
            handled += 1;
        }
        handled
    }

    /// Submit one scheduled commitment to the base ledger
    pub fn process_scheduled(&self, scheduled: ScheduledCommit) -> Result<Signature, ProtocolError> {
        let ScheduledCommit {
            request,
            request_commits,
            commitment,
            payload,
            undelegate,
        } = scheduled;
        let account = commitment.account;
        let seq = commitment.seq;
        let delegation_id = commitment.delegation_id;
        let ephemeral_slot = commitment.ephemeral_slot;

        let mut instructions = vec![BaseInstruction::CommitState {
            commitment: commitment.clone(),
            payload,
        }];
        if undelegate {
            instructions.push(BaseInstruction::Undelegate { account });
        }

        let transaction = SignedTransaction::new(
            &self.validator_keypair,
            instructions,
            self.base.latest_blockhash(),
        );

        let result = match self.base.submit(&transaction) {
            Err(
                err @ (ProtocolError::StaleCommit { .. }
                | ProtocolError::NotDelegated
                | ProtocolError::InvalidCommitment
                | ProtocolError::AlreadyProcessed),
            ) => self.already_landed(&commitment, undelegate).ok_or(err),
            other => other,
        };

        let outcome = match result {
            Ok(base_signature) => {
                self.landed.fetch_add(1, Ordering::Relaxed);
                self.eel.mark_committed(&account, &delegation_id, seq);
                if undelegate {
                    self.eel.release(&account, &delegation_id);
                }
                tracing::info!(
                    "Commit {} of {} landed on base ({}{})",
                    seq,
                    account,
                    base_signature,
                    if undelegate { ", undelegated" } else { "" }
                );
                CommitOutcome::Landed {
                    account,
                    seq,
                    base_signature,
                }
            }
            Err(error) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.eel.mark_uncommitted(&account, &delegation_id);
                if undelegate {
                    self.eel.abort_undelegation(&account, &delegation_id);
                }
                tracing::warn!("Commit {} of {} rejected by base: {}", seq, account, error);
                CommitOutcome::Rejected {
                    account,
                    seq,
                    error,
                }
            }
        };

        if let Some(request) = request {
            self.outcomes
                .entry(request)
                .or_insert_with(|| RequestOutcome {
                    expected: request_commits,
                    outcomes: Vec::with_capacity(request_commits),
                    ephemeral_slot,
                })
                .record(outcome);
        }

        result
    }

    /// A resubmitted commitment whose record already holds the same payload
    /// counts as landed. An undelegating retry only counts once its
    /// delegation cycle has ended.
    fn already_landed(&self, commitment: &Commitment, undelegate: bool) -> Option<Signature> {
        let record = self.base.commitment_record(
            &commitment.account,
            &commitment.delegation_id,
            commitment.seq,
        )?;
        if record.commitment.payload_hash != commitment.payload_hash {
            return None;
        }
        let still_delegated = self
            .base
            .delegation_record(&commitment.account)
            .map(|current| current.delegation_id == commitment.delegation_id)
            .unwrap_or(false);
        if undelegate && still_delegated {
            return None;
        }
        tracing::debug!(
            "Commit {} of {} was already landed by {}",
            commitment.seq,
            commitment.account,
            record.signature
        );
        Some(record.signature)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run the commit loop (tokio)
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "State committer started for {} ({}ms poll)",
            self.validator_pubkey(),
            self.config.poll_interval_ms
        );

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            let periodic = self.eel.schedule_due_commits(Instant::now());
            if !periodic.is_empty() {
                tracing::debug!("Scheduled {} periodic commits", periodic.len());
            }
            self.drain();

            let pruned = self.prune_outcomes();
            if pruned > 0 {
                tracing::debug!("Pruned {} commit request outcomes", pruned);
            }
        }

        // Land whatever was accepted before shutdown
        self.drain();
        tracing::info!("State committer stopped");
    }
}
