//! Ephemeral Layer Node
//!
//! Runs the base ledger, one ephemeral execution layer and the bridge
//! between them, with a JSON-RPC endpoint over both ledgers.
//! The base ledger is persisted to disk and survives restarts; the
//! ephemeral layer re-clones its delegated accounts on startup.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use delegation_bridge::{CommitterConfig, DelegationClient, PollConfig, StateCommitter};
use ledger_runtime::{
    builtin_programs, BaseLedger, BaseLedgerConfig, EphemeralLedger, Ledger, LedgerPersistence,
    PersistentStore, SlotProducer, SlotProducerConfig,
};
use rpc_server::{HttpRpcServer, RpcContext};
use solana_sdk::signature::{read_keypair_file, write_keypair_file, Keypair, Signer};
use std::{
    path::{Path, PathBuf},
    sync::{atomic::Ordering, Arc},
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod demo;

use config::NodeConfig;

/// Run mode
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Serve both ledgers over RPC until stopped
    Node,
    /// Run the delegation scenario once and exit
    Demo,
}

/// Ephemeral execution layer node
#[derive(Parser, Debug)]
#[command(name = "eel-node")]
#[command(about = "Base ledger plus an ephemeral execution layer for delegated accounts", long_about = None)]
struct Args {
    /// Run mode (node or demo)
    #[arg(long, value_enum, default_value = "node")]
    mode: Mode,

    /// HTTP RPC bind address
    #[arg(long, default_value = "127.0.0.1:8899")]
    rpc_addr: String,

    /// Base ledger slot time in milliseconds
    #[arg(long, default_value = "400")]
    base_slot_ms: u64,

    /// Ephemeral layer slot time in milliseconds
    #[arg(long, default_value = "50")]
    ephemeral_slot_ms: u64,

    /// Base slots on top of a slot before it is final
    #[arg(long, default_value = "2")]
    finality_depth: u64,

    /// Commit queue drain interval in milliseconds
    #[arg(long, default_value = "25")]
    commit_interval_ms: u64,

    /// Data directory for persistent state
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Save state every N base slots (0 = only on shutdown)
    #[arg(long, default_value = "300")]
    save_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON config file, replaces the flags above
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn node_config(&self) -> Result<NodeConfig> {
        if let Some(path) = &self.config {
            return NodeConfig::load(path);
        }
        Ok(NodeConfig {
            rpc_addr: self.rpc_addr.clone(),
            base_slot_ms: self.base_slot_ms,
            ephemeral_slot_ms: self.ephemeral_slot_ms,
            finality_depth: self.finality_depth,
            commit_interval_ms: self.commit_interval_ms,
            data_dir: self.data_dir.clone(),
            save_interval: self.save_interval,
            identity_path: None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.node_config()?;
    match args.mode {
        Mode::Node => run_node(config).await,
        Mode::Demo => demo::run(&config).await,
    }
}

/// The validator keypair must survive restarts so delegations can be restored
fn load_or_create_identity(path: &Path) -> Result<Keypair> {
    if path.exists() {
        return read_keypair_file(path)
            .map_err(|e| anyhow::anyhow!("reading identity {}: {}", path.display(), e));
    }

    let keypair = Keypair::new();
    write_keypair_file(&keypair, path)
        .map_err(|e| anyhow::anyhow!("writing identity {}: {}", path.display(), e))?;
    tracing::info!("Created new identity {} at {}", keypair.pubkey(), path.display());
    Ok(keypair)
}

fn save_ledger(base: &BaseLedger, store: &PersistentStore) {
    match base.save_to_disk(store) {
        Ok(count) => tracing::info!("Saved {} accounts at slot {}", count, base.current_slot()),
        Err(e) => tracing::error!("Failed to save base ledger: {}", e),
    }
}

async fn run_node(config: NodeConfig) -> Result<()> {
    tracing::info!("Starting ephemeral layer node");
    tracing::info!("  HTTP RPC: {}", config.rpc_addr);
    tracing::info!("  Base slot time: {}ms", config.base_slot_ms);
    tracing::info!("  Ephemeral slot time: {}ms", config.ephemeral_slot_ms);
    tracing::info!("  Finality depth: {} slots", config.finality_depth);
    tracing::info!("  Data directory: {:?}", config.data_dir);
    tracing::info!("  Save interval: {} slots", config.save_interval);

    std::fs::create_dir_all(&config.data_dir)?;
    let identity = Arc::new(load_or_create_identity(&config.identity_path())?);
    tracing::info!("  Identity: {}", identity.pubkey());

    // Open persistent store
    let persistent_store = Arc::new(PersistentStore::open(config.data_dir.join("ledger"))?);

    let base = Arc::new(BaseLedger::new(
        builtin_programs(),
        BaseLedgerConfig {
            finality_depth: config.finality_depth,
            ..Default::default()
        },
    ));

    // Load existing state from disk
    if let Some(metadata) = persistent_store.load_metadata()? {
        tracing::info!(
            "Loading state from disk: slot {}, {} accounts, {} commitments",
            metadata.slot,
            metadata.account_count,
            metadata.commitment_count
        );
        base.load_from_disk(&persistent_store)?;
    } else {
        tracing::info!("No existing state found, starting fresh");
    }

    let eel = Arc::new(EphemeralLedger::new(
        identity.pubkey(),
        base.clone(),
        builtin_programs(),
    ));
    let committer = Arc::new(StateCommitter::new(
        identity.clone(),
        base.clone(),
        eel.clone(),
        CommitterConfig {
            poll_interval_ms: config.commit_interval_ms,
        },
    ));
    let client = Arc::new(DelegationClient::new(
        base.clone(),
        eel.clone(),
        committer.clone(),
        PollConfig::default(),
    ));

    let restored = client.manager().restore_delegations();
    tracing::info!("Ephemeral layer holds {} delegated accounts", restored);

    // Slot producers
    let base_producer = SlotProducer::new(
        base.clone(),
        SlotProducerConfig {
            slot_time_ms: config.base_slot_ms,
            log_interval_slots: 100,
        },
    );
    let eel_producer = SlotProducer::new(
        eel.clone(),
        SlotProducerConfig {
            slot_time_ms: config.ephemeral_slot_ms,
            log_interval_slots: 1_000,
        },
    );
    let mut base_updates = base_producer.subscribe();
    let producer_flags = [base_producer.running_flag(), eel_producer.running_flag()];
    let base_producer_handle = tokio::spawn(base_producer.run_async());
    let eel_producer_handle = tokio::spawn(eel_producer.run_async());

    let committer_handle = tokio::spawn(committer.clone().run());

    // Periodic save to disk
    let persist_base = base.clone();
    let persist_store = persistent_store.clone();
    let save_interval = config.save_interval;
    let update_handler = tokio::spawn(async move {
        loop {
            match base_updates.recv().await {
                Ok(update) => {
                    if save_interval > 0 && update.slot % save_interval == 0 {
                        save_ledger(&persist_base, &persist_store);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Save task skipped {} slot updates", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Start HTTP RPC server
    let rpc_context = Arc::new(RpcContext {
        base: base.clone(),
        eel: eel.clone(),
        client,
    });
    let http_addr = config.rpc_addr.clone();
    let http_server = tokio::spawn(async move {
        let server = HttpRpcServer::new(rpc_context);
        if let Err(e) = server.run(&http_addr).await {
            tracing::error!("HTTP RPC server error: {}", e);
        }
    });

    tracing::info!("Node running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");

    // Land what the ephemeral layer already accepted, then stop the clocks
    committer.stop();
    committer_handle.await?;
    for flag in &producer_flags {
        flag.store(false, Ordering::SeqCst);
    }
    base_producer_handle.await?;
    eel_producer_handle.await?;

    save_ledger(&base, &persistent_store);

    update_handler.abort();
    http_server.abort();

    tracing::info!("Node stopped");

    Ok(())
}
