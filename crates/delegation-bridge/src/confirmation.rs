//! Commit confirmation resolution
//!
//! The ephemeral layer accepting a commit request is not proof that the
//! state is durable. A request is confirmed once the base transactions that
//! landed all of its commitments are finalized.

use ledger_runtime::{BaseLedger, Confirmation, EphemeralLedger, Ledger};
use serde::Serialize;
use solana_sdk::{clock::Slot, pubkey::Pubkey, signature::Signature};
use std::{sync::Arc, time::Duration};

use crate::{
    committer::{CommitOutcome, StateCommitter},
    error::{BridgeError, BridgeResult},
};

/// Backoff schedule for confirmation polling
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 50,
            max_backoff_ms: 1_000,
            max_attempts: 40,
        }
    }
}

/// One commitment of a request, final on the base ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedCommit {
    pub account: Pubkey,
    pub seq: u64,
    pub base_signature: Signature,
    pub base_slot: Slot,
    pub confirmation: Confirmation,
}

/// Proof that every commitment of a request is durable on the base ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitConfirmation {
    pub request: Signature,
    /// In the order the request scheduled them
    pub commits: Vec<FinalizedCommit>,
}

impl CommitConfirmation {
    pub fn commit(&self, account: &Pubkey) -> Option<&FinalizedCommit> {
        self.commits.iter().rev().find(|commit| commit.account == *account)
    }
}

pub struct ConfirmationResolver {
    base: Arc<BaseLedger>,
    eel: Arc<EphemeralLedger>,
    committer: Arc<StateCommitter>,
    config: PollConfig,
}

impl ConfirmationResolver {
    pub fn new(
        base: Arc<BaseLedger>,
        eel: Arc<EphemeralLedger>,
        committer: Arc<StateCommitter>,
        config: PollConfig,
    ) -> Self {
        Self {
            base,
            eel,
            committer,
            config,
        }
    }

    /// One non-blocking resolution step. `Ok(None)` means not final yet.
    ///
    /// A request is only confirmed once every commitment it scheduled has
    /// landed and is final; any rejected commitment fails the request.
    pub fn check(&self, request: &Signature) -> BridgeResult<Option<CommitConfirmation>> {
        let Some(progress) = self.committer.outcome(request) else {
            // Accepted by the ephemeral layer, not landed yet
            if self.eel.signature_status(request).is_some() {
                return Ok(None);
            }
            return Err(BridgeError::UnknownRequest(*request));
        };

        if let Some(CommitOutcome::Rejected {
            account,
            seq,
            error,
        }) = progress.rejection()
        {
            return Err(BridgeError::CommitRejected {
                account,
                seq,
                error,
            });
        }
        if !progress.is_complete() {
            return Ok(None);
        }

        let mut commits = Vec::with_capacity(progress.outcomes.len());
        for outcome in &progress.outcomes {
            let CommitOutcome::Landed {
                account,
                seq,
                base_signature,
            } = *outcome
            else {
                continue;
            };
            let Some(status) = self
                .base
                .signature_status(&base_signature)
                .filter(|status| status.is_finalized())
            else {
                return Ok(None);
            };
            commits.push(FinalizedCommit {
                account,
                seq,
                base_signature,
                base_slot: status.slot,
                confirmation: status.confirmation,
            });
        }

        Ok(Some(CommitConfirmation {
            request: *request,
            commits,
        }))
    }

    /// Poll until the commit requested by `request` is final on the base
    /// ledger, backing off exponentially between attempts.
    pub async fn resolve(&self, request: &Signature) -> BridgeResult<CommitConfirmation> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);

        for attempt in 1..=self.config.max_attempts {
            if let Some(confirmation) = self.check(request)? {
                tracing::debug!(
                    "Commit request {} final after {} attempts",
                    request,
                    attempt
                );
                return Ok(confirmation);
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }

        tracing::warn!(
            "Commit request {} not final after {} attempts",
            request,
            self.config.max_attempts
        );
        Err(BridgeError::ConfirmationTimeout {
            request: *request,
            attempts: self.config.max_attempts,
        })
    }
}
