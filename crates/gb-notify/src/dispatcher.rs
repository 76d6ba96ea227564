//! Leases intents off the outbox, invokes a [`ChannelAdapter`], and records
//! the outcome. Grounded on `gb-live::broker::Broker`'s async method shape:
//! one small trait, one coherent result enum, no hidden state.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use gb_types::{GbResult, IntentId};
use tracing::{info, warn};

use crate::adapter::{ChannelAdapter, SendOutcome};
use crate::outbox::Outbox;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub lease_seconds: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { batch_size: 16, lease_seconds: 30 }
    }
}

/// One dispatch worker. Multiple `Dispatcher`s may share one `Outbox` safely
/// — the outbox's atomic lease guarantees no two dispatchers are ever handed
/// the same intent — but each dispatcher owns exactly one `ChannelAdapter`.
pub struct Dispatcher {
    outbox: Arc<Outbox>,
    adapter: Arc<dyn ChannelAdapter>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(outbox: Arc<Outbox>, adapter: Arc<dyn ChannelAdapter>, config: DispatcherConfig) -> Self {
        Self { outbox, adapter, config }
    }

    /// Leases one batch and attempts delivery of every intent in it in turn.
    /// Returns the number of intents leased this round (0 means the outbox
    /// had nothing due).
    pub async fn dispatch_once(&self) -> GbResult<usize> {
        let lease_duration = ChronoDuration::seconds(self.config.lease_seconds);
        let batch = self.outbox.lease(self.config.batch_size, lease_duration)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let sends = batch.iter().map(|intent| self.adapter.send(intent));
        let outcomes = futures_join_all(sends).await;

        for (intent, outcome) in batch.iter().zip(outcomes) {
            self.apply_outcome(intent.id, outcome)?;
        }
        Ok(batch.len())
    }

    fn apply_outcome(&self, intent_id: IntentId, outcome: SendOutcome) -> GbResult<()> {
        match outcome {
            SendOutcome::Ok => {
                info!(intent_id = %intent_id, adapter = self.adapter.name(), "intent delivered");
                self.outbox.mark_sent(intent_id)
            }
            SendOutcome::Retryable { reason, retry_after } => {
                warn!(intent_id = %intent_id, %reason, "intent delivery failed, will retry");
                self.outbox.mark_failed(intent_id, reason)?;
                if let Some(retry_after) = retry_after {
                    let not_before = Utc::now()
                        + ChronoDuration::from_std(retry_after).unwrap_or(ChronoDuration::seconds(0));
                    self.outbox.honor_retry_not_before(intent_id, not_before)?;
                }
                Ok(())
            }
            SendOutcome::Permanent { reason } => {
                warn!(intent_id = %intent_id, %reason, "intent delivery failed permanently, dead-lettering");
                self.outbox.mark_dead_letter(intent_id, reason)
            }
        }
    }

    /// Runs `dispatch_once` in a loop, sleeping `poll_interval` between empty
    /// rounds, until `cancel` reports true. Intended to be driven by one
    /// `tokio::spawn`'d task per dispatcher worker; `cancel` is a plain
    /// `Arc<AtomicBool>` check rather than a shared type from `gb-engine`, so
    /// this crate stays independent of the backtest kernel.
    pub async fn run_loop(&self, poll_interval: std::time::Duration, cancel: &std::sync::atomic::AtomicBool) -> GbResult<()> {
        while !cancel.load(std::sync::atomic::Ordering::SeqCst) {
            let leased = self.dispatch_once().await?;
            if leased == 0 {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Ok(())
    }
}

/// Small local stand-in for `futures::future::join_all` to avoid pulling in
/// the `futures` crate for one call site. Awaits each future in sequence and
/// collects results in order.
async fn futures_join_all<F, T>(futures: impl Iterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T>,
{
    let mut results = Vec::new();
    for future in futures {
        results.push(future.await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::NullChannelAdapter;
    use crate::outbox::OutboxConfig;
    use gb_types::{IntentSeverity, IntentType, NotificationIntent};

    #[tokio::test]
    async fn dispatch_once_marks_sent_via_null_adapter() {
        let outbox = Arc::new(Outbox::new(OutboxConfig::default()));
        outbox
            .enqueue(NotificationIntent::new(
                "k1",
                IntentType::StrategySignal,
                IntentSeverity::Info,
                serde_json::json!({}),
                "chat-main",
            ))
            .unwrap();

        let dispatcher = Dispatcher::new(outbox.clone(), Arc::new(NullChannelAdapter), DispatcherConfig::default());
        let leased = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(leased, 1);
        assert_eq!(outbox.metrics().sent, 1);
    }

    #[tokio::test]
    async fn empty_outbox_leases_nothing() {
        let outbox = Arc::new(Outbox::new(OutboxConfig::default()));
        let dispatcher = Dispatcher::new(outbox, Arc::new(NullChannelAdapter), DispatcherConfig::default());
        assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);
    }
}
