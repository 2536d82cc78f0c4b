//! RPC Server - JSON-RPC over both ledgers
//!
//! Every method takes an optional `{"ledger": "base" | "ephemeral"}` object
//! selecting the ledger it reads from or submits to (base by default):
//! - Transactions: sendTransaction, getSignatureStatus
//! - Accounts: getAccountInfo, getDelegationRecord, getCommitment
//! - Commit confirmation: getCommitSignature
//! - Clock: getLatestBlockhash, getSlot
//! - Node: getIdentity, getHealth, getVersion

pub mod http_server;
pub mod methods;

pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};

/// RPC Server configuration
#[derive(Clone, Debug)]
pub struct RpcServerConfig {
    /// HTTP RPC bind address
    pub http_addr: String,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8899".to_string(),
        }
    }
}
