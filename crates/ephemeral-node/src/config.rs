//! Node Configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Node configuration, loadable from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP RPC bind address
    pub rpc_addr: String,
    /// Base ledger slot time in milliseconds
    pub base_slot_ms: u64,
    /// Ephemeral layer slot time in milliseconds
    pub ephemeral_slot_ms: u64,
    /// Base slots produced on top of a slot before it is final
    pub finality_depth: u64,
    /// How often the committer drains the commit queue
    pub commit_interval_ms: u64,
    /// Data directory for persistent state
    pub data_dir: PathBuf,
    /// Save the base ledger every N slots (0 = only on shutdown)
    pub save_interval: u64,
    /// Validator keypair, created under `data_dir` when missing
    pub identity_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "127.0.0.1:8899".to_string(),
            base_slot_ms: ledger_runtime::BASE_SLOT_TIME_MS,
            ephemeral_slot_ms: ledger_runtime::EPHEMERAL_SLOT_TIME_MS,
            finality_depth: ledger_runtime::DEFAULT_FINALITY_DEPTH,
            commit_interval_ms: 25,
            data_dir: PathBuf::from("./data"),
            save_interval: 300,
            identity_path: None,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn identity_path(&self) -> PathBuf {
        self.identity_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("identity.json"))
    }
}
