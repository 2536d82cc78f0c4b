//! RPC Methods - JSON-RPC method handlers
//!
//! Handlers take parsed requests and read from or submit to the ledger the
//! request selects.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use delegation_bridge::{BridgeError, DelegationClient, FinalizedCommit};
use delegation_types::{
    BaseInstruction, CommitmentRecord, DelegationRecord, EphemeralInstruction, LedgerKind,
    ProtocolError, SignedTransaction, MAX_RECENT_BLOCKHASHES,
};
use ledger_runtime::{BaseLedger, EphemeralLedger, Ledger, SignatureStatus};
use serde::{Deserialize, Serialize};
use solana_sdk::{clock::Slot, hash::Hash, pubkey::Pubkey, signature::Signature};
use std::sync::Arc;

/// RPC context shared across handlers
pub struct RpcContext {
    pub base: Arc<BaseLedger>,
    pub eel: Arc<EphemeralLedger>,
    pub client: Arc<DelegationClient>,
}

impl RpcContext {
    fn current_slot(&self, ledger: LedgerKind) -> Slot {
        match ledger {
            LedgerKind::Base => self.base.current_slot(),
            LedgerKind::Ephemeral => self.eel.current_slot(),
        }
    }
}

// ============ Request/Response Types ============

#[derive(Debug)]
pub struct SendTransactionRequest {
    /// Base64 encoded borsh `SignedTransaction`
    pub transaction: String,
    pub ledger: LedgerKind,
}

#[derive(Debug)]
pub struct GetAccountInfoRequest {
    pub pubkey: Pubkey,
    pub ledger: LedgerKind,
    pub encoding: Option<String>,
}

#[derive(Debug)]
pub struct GetCommitmentRequest {
    pub account: Pubkey,
    pub seq: u64,
    /// Defaults to the most recent cycle with a commitment at `seq`
    pub delegation_id: Option<Hash>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseContext {
    pub slot: Slot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    pub data: (String, String), // (data, encoding)
    pub lamports: u64,
    pub owner: String,
    pub delegated: bool,
    pub slot: Slot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetAccountInfoResponse {
    pub context: ResponseContext,
    pub value: Option<AccountInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRecordInfo {
    pub owner_before: String,
    pub delegated_to: String,
    pub delegation_slot: Slot,
    pub delegation_id: String,
    pub last_commit_seq: u64,
    pub last_committed_snapshot: String,
    pub commit_frequency_ms: u64,
}

impl From<DelegationRecord> for DelegationRecordInfo {
    fn from(record: DelegationRecord) -> Self {
        Self {
            owner_before: record.owner_before.to_string(),
            delegated_to: record.delegated_to.to_string(),
            delegation_slot: record.delegation_slot,
            delegation_id: record.delegation_id.to_string(),
            last_commit_seq: record.last_commit_seq,
            last_committed_snapshot: BASE64.encode(&record.last_committed_snapshot),
            commit_frequency_ms: record.commit_frequency_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentInfo {
    pub account: String,
    pub seq: u64,
    pub payload_hash: String,
    pub delegation_id: String,
    pub ephemeral_slot: Slot,
    pub identity: String,
    pub signature: String,
    pub base_slot: Slot,
    pub base_blockhash: String,
}

impl From<CommitmentRecord> for CommitmentInfo {
    fn from(record: CommitmentRecord) -> Self {
        Self {
            account: record.commitment.account.to_string(),
            seq: record.commitment.seq,
            payload_hash: record.commitment.payload_hash.to_string(),
            delegation_id: record.commitment.delegation_id.to_string(),
            ephemeral_slot: record.commitment.ephemeral_slot,
            identity: record.identity.to_string(),
            signature: record.signature.to_string(),
            base_slot: record.base_slot,
            base_blockhash: record.base_blockhash.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSignatureInfo {
    pub request: String,
    pub commits: Vec<FinalizedCommitInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedCommitInfo {
    pub account: String,
    pub seq: u64,
    pub base_signature: String,
    pub base_slot: Slot,
}

impl From<&FinalizedCommit> for FinalizedCommitInfo {
    fn from(commit: &FinalizedCommit) -> Self {
        Self {
            account: commit.account.to_string(),
            seq: commit.seq,
            base_signature: commit.base_signature.to_string(),
            base_slot: commit.base_slot,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockhashInfo {
    pub blockhash: String,
    #[serde(rename = "lastValidBlockHeight")]
    pub last_valid_block_height: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetLatestBlockhashResponse {
    pub context: ResponseContext,
    pub value: BlockhashInfo,
}

// ============ RPC Handlers ============

/// Handle sendTransaction RPC method
pub fn handle_send_transaction(
    ctx: &RpcContext,
    params: SendTransactionRequest,
) -> Result<String, RpcError> {
    let tx_bytes = BASE64
        .decode(&params.transaction)
        .map_err(|_| RpcError::InvalidParams("Invalid base64 encoding".to_string()))?;
    let invalid = |_| RpcError::InvalidParams("Invalid transaction format".to_string());

    let signature = match params.ledger {
        LedgerKind::Base => {
            let tx = SignedTransaction::<BaseInstruction>::from_bytes(&tx_bytes).map_err(invalid)?;
            ctx.base.submit(&tx)?
        }
        LedgerKind::Ephemeral => {
            let tx =
                SignedTransaction::<EphemeralInstruction>::from_bytes(&tx_bytes).map_err(invalid)?;
            ctx.eel.submit(&tx)?
        }
    };

    Ok(signature.to_string())
}

/// Handle getAccountInfo RPC method
pub fn handle_get_account_info(
    ctx: &RpcContext,
    params: GetAccountInfoRequest,
) -> Result<GetAccountInfoResponse, RpcError> {
    let slot = ctx.current_slot(params.ledger);

    let value = ctx
        .client
        .fetch_account(params.ledger, &params.pubkey)
        .map(|account| {
            let encoding = params.encoding.as_deref().unwrap_or("base64");
            let data = match encoding {
                "base58" => (bs58::encode(&account.data).into_string(), "base58".to_string()),
                _ => (BASE64.encode(&account.data), "base64".to_string()),
            };

            AccountInfo {
                data,
                lamports: account.lamports,
                owner: account.owner.to_string(),
                delegated: account.delegated,
                slot: account.slot,
            }
        });

    Ok(GetAccountInfoResponse {
        context: ResponseContext { slot },
        value,
    })
}

/// Handle getDelegationRecord RPC method (always read from the base ledger)
pub fn handle_get_delegation_record(
    ctx: &RpcContext,
    account: &Pubkey,
) -> Result<Option<DelegationRecordInfo>, RpcError> {
    Ok(ctx.base.delegation_record(account).map(Into::into))
}

/// Handle getCommitment RPC method
pub fn handle_get_commitment(
    ctx: &RpcContext,
    params: GetCommitmentRequest,
) -> Result<Option<CommitmentInfo>, RpcError> {
    let record = match params.delegation_id {
        Some(delegation_id) => ctx
            .base
            .commitment_record(&params.account, &delegation_id, params.seq),
        None => ctx
            .base
            .commitments_for(&params.account)
            .into_iter()
            .filter(|record| record.commitment.seq == params.seq)
            .last(),
    };
    Ok(record.map(Into::into))
}

/// Handle getSignatureStatus RPC method
pub fn handle_get_signature_status(
    ctx: &RpcContext,
    signature: &Signature,
    ledger: LedgerKind,
) -> Result<Option<SignatureStatus>, RpcError> {
    Ok(match ledger {
        LedgerKind::Base => ctx.base.signature_status(signature),
        LedgerKind::Ephemeral => ctx.eel.signature_status(signature),
    })
}

/// Handle getCommitSignature RPC method. `None` until every commit of the
/// request is final.
pub fn handle_get_commit_signature(
    ctx: &RpcContext,
    request: &Signature,
) -> Result<Option<CommitSignatureInfo>, RpcError> {
    let confirmation = ctx
        .client
        .resolver()
        .check(request)
        .map_err(RpcError::Commit)?;

    Ok(confirmation.map(|confirmation| CommitSignatureInfo {
        request: confirmation.request.to_string(),
        commits: confirmation.commits.iter().map(Into::into).collect(),
    }))
}

/// Handle getLatestBlockhash RPC method
pub fn handle_get_latest_blockhash(
    ctx: &RpcContext,
    ledger: LedgerKind,
) -> Result<GetLatestBlockhashResponse, RpcError> {
    let slot = ctx.current_slot(ledger);
    let blockhash = match ledger {
        LedgerKind::Base => ctx.base.latest_blockhash(),
        LedgerKind::Ephemeral => ctx.eel.latest_blockhash(),
    };

    Ok(GetLatestBlockhashResponse {
        context: ResponseContext { slot },
        value: BlockhashInfo {
            blockhash: blockhash.to_string(),
            last_valid_block_height: slot + MAX_RECENT_BLOCKHASHES as u64,
        },
    })
}

/// Handle getSlot RPC method
pub fn handle_get_slot(ctx: &RpcContext, ledger: LedgerKind) -> Result<Slot, RpcError> {
    Ok(ctx.current_slot(ledger))
}

/// Handle getIdentity RPC method
pub fn handle_get_identity(ctx: &RpcContext) -> Result<String, RpcError> {
    Ok(ctx.eel.identity().to_string())
}

/// Handle getHealth RPC method
pub fn handle_get_health() -> Result<String, RpcError> {
    Ok("ok".to_string())
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Transaction rejected: {0}")]
    TransactionRejected(#[from] ProtocolError),
    #[error("{0}")]
    Commit(BridgeError),
}

impl RpcError {
    /// Ledger error code carried in the JSON-RPC error data
    pub fn protocol_code(&self) -> Option<u32> {
        match self {
            RpcError::TransactionRejected(err) => Some(err.code()),
            RpcError::Commit(err) => err.protocol_error().map(|err| err.code()),
            _ => None,
        }
    }
}
