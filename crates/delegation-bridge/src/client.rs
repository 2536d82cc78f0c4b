//! Client facade over both ledgers
//!
//! One entry point per external operation. Writes are routed to the
//! ephemeral layer when it holds the account and to the base ledger
//! otherwise; commit and undelegate requests go to the ephemeral layer,
//! which holds the authority to land them on the base ledger.

use delegation_types::{
    AccountView, EphemeralInstruction, Invoke, LedgerKind, SignedTransaction,
    DEFAULT_COMMIT_FREQUENCY_MS,
};
use ledger_runtime::{BaseLedger, EphemeralLedger, Ledger};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::sync::Arc;

use crate::{
    committer::StateCommitter,
    confirmation::{CommitConfirmation, ConfirmationResolver, PollConfig},
    delegator::DelegationManager,
    error::BridgeResult,
};

pub struct DelegationClient {
    base: Arc<BaseLedger>,
    eel: Arc<EphemeralLedger>,
    manager: DelegationManager,
    resolver: ConfirmationResolver,
}

impl DelegationClient {
    pub fn new(
        base: Arc<BaseLedger>,
        eel: Arc<EphemeralLedger>,
        committer: Arc<StateCommitter>,
        poll: PollConfig,
    ) -> Self {
        Self {
            manager: DelegationManager::new(base.clone(), eel.clone()),
            resolver: ConfirmationResolver::new(base.clone(), eel.clone(), committer, poll),
            base,
            eel,
        }
    }

    pub fn manager(&self) -> &DelegationManager {
        &self.manager
    }

    pub fn resolver(&self) -> &ConfirmationResolver {
        &self.resolver
    }

    /// Delegate with the default commit frequency
    pub fn delegate(&self, account: &Pubkey, requester: &Keypair) -> BridgeResult<Signature> {
        self.manager
            .delegate(account, requester, DEFAULT_COMMIT_FREQUENCY_MS)
    }

    pub fn delegate_with_frequency(
        &self,
        account: &Pubkey,
        requester: &Keypair,
        commit_frequency_ms: u64,
    ) -> BridgeResult<Signature> {
        self.manager.delegate(account, requester, commit_frequency_ms)
    }

    /// The ledger that currently accepts writes for `account`
    pub fn write_target(&self, account: &Pubkey) -> LedgerKind {
        if self.manager.is_delegated(account) {
            LedgerKind::Ephemeral
        } else {
            LedgerKind::Base
        }
    }

    /// Apply a program write on whichever ledger holds the account
    pub fn write(&self, payer: &Keypair, invoke: Invoke) -> BridgeResult<(LedgerKind, Signature)> {
        let target = self.write_target(&invoke.account);
        let signature = match target {
            LedgerKind::Ephemeral => self.eel.apply_write(payer, invoke)?,
            LedgerKind::Base => self.base.apply_write(payer, invoke)?,
        };
        Ok((target, signature))
    }

    fn submit_ephemeral(
        &self,
        payer: &Keypair,
        instructions: Vec<EphemeralInstruction>,
    ) -> BridgeResult<Signature> {
        let transaction = SignedTransaction::new(payer, instructions, self.eel.latest_blockhash());
        Ok(self.eel.submit(&transaction)?)
    }

    /// Request a commit of the current ephemeral state. The returned
    /// signature identifies the request for confirmation resolution.
    pub fn commit(&self, account: &Pubkey, payer: &Keypair) -> BridgeResult<Signature> {
        self.submit_ephemeral(payer, vec![EphemeralInstruction::Commit { account: *account }])
    }

    /// Request a final commit followed by the return of the account
    pub fn undelegate(&self, account: &Pubkey, payer: &Keypair) -> BridgeResult<Signature> {
        self.submit_ephemeral(payer, vec![EphemeralInstruction::Undelegate { account: *account }])
    }

    /// Apply a write on the ephemeral layer and commit the result
    pub fn write_and_commit(&self, payer: &Keypair, invoke: Invoke) -> BridgeResult<Signature> {
        let account = invoke.account;
        self.submit_ephemeral(
            payer,
            vec![invoke.into(), EphemeralInstruction::Commit { account }],
        )
    }

    /// Apply a write on the ephemeral layer, then commit and undelegate
    pub fn write_and_undelegate(&self, payer: &Keypair, invoke: Invoke) -> BridgeResult<Signature> {
        let account = invoke.account;
        self.submit_ephemeral(
            payer,
            vec![invoke.into(), EphemeralInstruction::Undelegate { account }],
        )
    }

    /// The account as `ledger` currently sees it
    pub fn fetch_account(&self, ledger: LedgerKind, account: &Pubkey) -> Option<AccountView> {
        match ledger {
            LedgerKind::Base => self.base.fetch_account(account),
            LedgerKind::Ephemeral => self.eel.fetch_account(account),
        }
    }

    /// Wait until the commit requested by `request` is final on the base ledger
    pub async fn resolve_commit_confirmation(
        &self,
        request: &Signature,
    ) -> BridgeResult<CommitConfirmation> {
        self.resolver.resolve(request).await
    }
}
