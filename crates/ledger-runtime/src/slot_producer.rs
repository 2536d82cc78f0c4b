//! Slot Producer
//!
//! Ticks a ledger at a fixed interval. Each tick closes the current slot,
//! rotates the recent blockhash and advances finality.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::broadcast;

use crate::ledger::{SlotClock, SlotUpdate};

/// Slot producer configuration
#[derive(Clone, Debug)]
pub struct SlotProducerConfig {
    /// Slot time in milliseconds
    pub slot_time_ms: u64,
    /// Log a summary every this many slots (0 disables)
    pub log_interval_slots: u64,
}

impl Default for SlotProducerConfig {
    fn default() -> Self {
        Self {
            slot_time_ms: crate::BASE_SLOT_TIME_MS,
            log_interval_slots: 0,
        }
    }
}

pub struct SlotProducer {
    ledger: Arc<dyn SlotClock>,
    update_sender: broadcast::Sender<SlotUpdate>,
    config: SlotProducerConfig,
    /// Set until stopped
    running: Arc<AtomicBool>,
}

impl SlotProducer {
    pub fn new(ledger: Arc<dyn SlotClock>, config: SlotProducerConfig) -> Self {
        let (update_sender, _) = broadcast::channel(64);

        Self {
            ledger,
            update_sender,
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Subscribe to slot updates
    pub fn subscribe(&self) -> broadcast::Receiver<SlotUpdate> {
        self.update_sender.subscribe()
    }

    /// Handle that stops the producer when cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run the slot loop (tokio)
    pub async fn run_async(self) {
        let kind = self.ledger.kind();
        let slot_duration = Duration::from_millis(self.config.slot_time_ms.max(1));
        let mut interval = tokio::time::interval(slot_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "{} slot producer started ({}ms slots)",
            kind,
            self.config.slot_time_ms
        );

        // The first tick completes immediately
        interval.tick().await;

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            let tick_start = Instant::now();

            let update = self.ledger.advance_slot();
            let _ = self.update_sender.send(update);

            let processing_time = tick_start.elapsed();
            if processing_time > slot_duration {
                tracing::warn!(
                    "{} slot {} took {:.2}ms (target: {}ms)",
                    kind,
                    update.slot,
                    processing_time.as_secs_f64() * 1000.0,
                    self.config.slot_time_ms
                );
            }

            if self.config.log_interval_slots > 0 && update.slot % self.config.log_interval_slots == 0 {
                tracing::debug!(
                    "{} slot {} (finalized {:?})",
                    kind,
                    update.slot,
                    update.finalized_slot
                );
            }
        }

        tracing::info!("{} slot producer stopped", kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtin_programs, BaseLedger, BaseLedgerConfig, Ledger};

    #[tokio::test]
    async fn test_producer_advances_slots() {
        let ledger = Arc::new(BaseLedger::new(builtin_programs(), BaseLedgerConfig::default()));
        let producer = SlotProducer::new(
            ledger.clone(),
            SlotProducerConfig {
                slot_time_ms: 5,
                log_interval_slots: 0,
            },
        );
        let mut updates = producer.subscribe();
        let running = producer.running_flag();

        let handle = tokio::spawn(producer.run_async());

        let first = updates.recv().await.unwrap();
        let second = updates.recv().await.unwrap();
        assert!(second.slot > first.slot);
        assert!(ledger.current_slot() >= second.slot);

        running.store(false, Ordering::SeqCst);
        handle.await.unwrap();
    }
}
