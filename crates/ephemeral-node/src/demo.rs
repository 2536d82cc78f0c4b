//! Demo scenario
//!
//! Runs a counter through a full delegation cycle against in-process
//! ledgers: delegate, write on the ephemeral layer, commit, undelegate.
//! Any unexpected state fails the run.

use anyhow::{ensure, Context, Result};
use counter_program::{counter_address, instruction, Counter};
use delegation_bridge::{CommitterConfig, DelegationClient, PollConfig, StateCommitter};
use delegation_types::{delegation_program, LedgerKind};
use ledger_runtime::{
    builtin_programs, BaseLedger, BaseLedgerConfig, EphemeralLedger, SlotProducer,
    SlotProducerConfig,
};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::sync::{atomic::Ordering, Arc};

use crate::config::NodeConfig;

fn count_on(client: &DelegationClient, ledger: LedgerKind, counter: &Pubkey) -> Result<u64> {
    let view = client
        .fetch_account(ledger, counter)
        .with_context(|| format!("counter missing on {} ledger", ledger))?;
    Ok(Counter::from_bytes(&view.data).context("bad counter data")?.count)
}

pub async fn run(config: &NodeConfig) -> Result<()> {
    tracing::info!("Running delegation demo");

    let validator = Arc::new(Keypair::new());
    let base = Arc::new(BaseLedger::new(
        builtin_programs(),
        BaseLedgerConfig {
            finality_depth: config.finality_depth,
            ..Default::default()
        },
    ));
    let eel = Arc::new(EphemeralLedger::new(
        validator.pubkey(),
        base.clone(),
        builtin_programs(),
    ));
    let committer = Arc::new(StateCommitter::new(
        validator,
        base.clone(),
        eel.clone(),
        CommitterConfig {
            poll_interval_ms: config.commit_interval_ms,
        },
    ));
    let client = DelegationClient::new(
        base.clone(),
        eel.clone(),
        committer.clone(),
        PollConfig::default(),
    );

    let base_producer = SlotProducer::new(
        base.clone(),
        SlotProducerConfig {
            slot_time_ms: config.base_slot_ms,
            log_interval_slots: 0,
        },
    );
    let eel_producer = SlotProducer::new(
        eel.clone(),
        SlotProducerConfig {
            slot_time_ms: config.ephemeral_slot_ms,
            log_interval_slots: 0,
        },
    );
    let running = [base_producer.running_flag(), eel_producer.running_flag()];
    let handles = [
        tokio::spawn(base_producer.run_async()),
        tokio::spawn(eel_producer.run_async()),
        tokio::spawn(committer.clone().run()),
    ];

    let result = scenario(&client).await;

    committer.stop();
    for flag in &running {
        flag.store(false, Ordering::SeqCst);
    }
    for handle in handles {
        handle.await?;
    }

    match &result {
        Ok(()) => tracing::info!("Demo completed"),
        Err(e) => tracing::error!("Demo failed: {:#}", e),
    }
    result
}

async fn scenario(client: &DelegationClient) -> Result<()> {
    let controller = Keypair::new();
    let counter = counter_address(&controller.pubkey());

    client.write(&controller, instruction::initialize(counter))?;
    ensure!(count_on(client, LedgerKind::Base, &counter)? == 0, "counter should start at 0");
    tracing::info!("[1/5] Counter {} created on base ledger", counter);

    client.delegate(&counter, &controller)?;
    let view = client
        .fetch_account(LedgerKind::Base, &counter)
        .context("counter missing after delegation")?;
    ensure!(
        view.owner == delegation_program::id(),
        "delegation program should own the counter"
    );
    tracing::info!("[2/5] Counter delegated to the ephemeral layer");

    let (ledger, _) = client.write(&Keypair::new(), instruction::increment(counter))?;
    ensure!(ledger == LedgerKind::Ephemeral, "write should route to the ephemeral layer");
    ensure!(count_on(client, LedgerKind::Ephemeral, &counter)? == 1, "ephemeral count should be 1");
    ensure!(count_on(client, LedgerKind::Base, &counter)? == 0, "base count should still be 0");
    tracing::info!("[3/5] Incremented on the ephemeral layer, base unchanged");

    let request = client.commit(&counter, &controller)?;
    let confirmation = client.resolve_commit_confirmation(&request).await?;
    let commit = confirmation
        .commit(&counter)
        .context("commit confirmation missing the counter")?;
    ensure!(count_on(client, LedgerKind::Base, &counter)? == 1, "base count should be 1 after commit");
    tracing::info!(
        "[4/5] Commit {} final on base at slot {} ({})",
        commit.seq,
        commit.base_slot,
        commit.base_signature
    );

    let request = client.write_and_undelegate(&Keypair::new(), instruction::increment(counter))?;
    let confirmation = client.resolve_commit_confirmation(&request).await?;
    let commit = confirmation
        .commit(&counter)
        .context("undelegation confirmation missing the counter")?;
    let view = client
        .fetch_account(LedgerKind::Base, &counter)
        .context("counter missing after undelegation")?;
    ensure!(
        view.owner == counter_program::id(),
        "counter program should own the counter again"
    );
    ensure!(count_on(client, LedgerKind::Base, &counter)? == 2, "no update may be lost");
    ensure!(
        client.fetch_account(LedgerKind::Ephemeral, &counter).is_none(),
        "ephemeral snapshot should be released"
    );
    tracing::info!(
        "[5/5] Incremented and undelegated with final commit {}, base count 2",
        commit.seq
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_scenario_passes() {
        let config = NodeConfig {
            base_slot_ms: 5,
            ephemeral_slot_ms: 2,
            commit_interval_ms: 2,
            ..Default::default()
        };
        run(&config).await.unwrap();
    }
}
