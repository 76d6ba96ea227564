//! `RunManager`: submission, admission control, worker process lifecycle,
//! and event fan-out for every run the orchestrator owns.
//!
//! One worker process per run (`tokio::process::Command` spawning the
//! `engine_service` binary) gives each run full isolation: a panicking or
//! runaway strategy cannot take another run down with it. `RunStore` is the
//! durable source of truth; everything else here (subscriber channels, the
//! overflow queue, live `Child` handles) is in-memory and rebuilt from
//! scratch on restart — a restart simply cannot resume an in-flight worker,
//! it can only see its terminal outcome once journaled.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use gb_types::{Event, GbError, GbResult, OrchestratorError, Run, RunId, RunStatus};
use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::ipc;
use crate::protocol::{WorkerMessage, WorkerRequest};
use crate::store::RunStore;

#[derive(Debug, Clone)]
pub struct RunManagerConfig {
    pub max_concurrent_runs: usize,
    pub max_queued_runs: usize,
    pub worker_binary: PathBuf,
    pub ring_buffer_capacity: usize,
    pub subscriber_channel_capacity: usize,
}

impl Default for RunManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            max_queued_runs: 64,
            worker_binary: default_worker_binary(),
            ring_buffer_capacity: 256,
            subscriber_channel_capacity: 256,
        }
    }
}

/// `engine_service` ships as a sibling binary in the same build output
/// directory as whatever embeds this crate; falls back to a bare name
/// resolved via `PATH` if the current executable's directory can't be
/// determined.
fn default_worker_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("engine_service")))
        .unwrap_or_else(|| PathBuf::from("engine_service"))
}

struct RunHandle {
    child: Mutex<Option<Child>>,
}

pub struct RunManager {
    store: Arc<RunStore>,
    config: RunManagerConfig,
    handles: DashMap<RunId, RunHandle>,
    ring: DashMap<RunId, VecDeque<Event>>,
    subscribers: DashMap<RunId, Vec<mpsc::Sender<Event>>>,
    overflow: Mutex<VecDeque<RunId>>,
}

impl RunManager {
    pub fn new(store: Arc<RunStore>, config: RunManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            handles: DashMap::new(),
            ring: DashMap::new(),
            subscribers: DashMap::new(),
            overflow: Mutex::new(VecDeque::new()),
        })
    }

    /// Validates and journals a new run as `pending`. Does not start it —
    /// call `start` once the caller is ready for it to consume a worker
    /// slot.
    pub fn submit(&self, name: impl Into<String>, config_value: serde_json::Value, strict: bool) -> GbResult<RunId> {
        let _config = RunConfig::parse(config_value.clone(), strict)?;
        let run = Run::new(name, config_value, self.config.ring_buffer_capacity);
        let run_id = run.id;
        self.store.insert(run)?;
        Ok(run_id)
    }

    /// Admits `run_id` to run immediately if a worker slot is free,
    /// otherwise appends it to the bounded FIFO overflow queue. Takes the
    /// manager by its `Arc` since admission may hand off to a spawned task
    /// that outlives this call.
    pub fn start(self: Arc<Self>, run_id: RunId) -> GbResult<()> {
        self.store.get(run_id)?;
        if self.store.count_active() < self.config.max_concurrent_runs {
            self.spawn_worker(run_id);
            return Ok(());
        }
        let mut overflow = self.overflow.lock();
        if overflow.len() >= self.config.max_queued_runs {
            return Err(GbError::Orchestrator(OrchestratorError::ResourceExhausted {
                capacity: self.config.max_queued_runs,
            }));
        }
        overflow.push_back(run_id);
        info!(%run_id, queued = overflow.len(), "run queued, no worker slot free");
        Ok(())
    }

    pub fn cancel(&self, run_id: RunId) -> GbResult<()> {
        {
            let mut overflow = self.overflow.lock();
            overflow.retain(|id| *id != run_id);
        }
        if let Some(handle) = self.handles.get(&run_id) {
            if let Some(mut child) = handle.child.lock().take() {
                let _ = child.start_kill();
            }
        }
        self.store.update(run_id, |run| run.transition(RunStatus::Canceled))?;
        Ok(())
    }

    /// Subscribes to `run_id`'s event stream. Replays the run's ring buffer
    /// (already-emitted events a late joiner missed) before returning the
    /// receiver that live events will continue to arrive on.
    pub fn stream(&self, run_id: RunId) -> GbResult<mpsc::Receiver<Event>> {
        self.store.get(run_id)?;
        let (tx, rx) = mpsc::channel(self.config.subscriber_channel_capacity);
        if let Some(backlog) = self.ring.get(&run_id) {
            for event in backlog.iter() {
                let _ = tx.try_send(event.clone());
            }
        }
        self.subscribers.entry(run_id).or_default().push(tx);
        Ok(rx)
    }

    fn push_event(&self, run_id: RunId, event: Event) {
        {
            let mut ring = self.ring.entry(run_id).or_insert_with(VecDeque::new);
            if ring.len() >= self.config.ring_buffer_capacity {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        if let Some(mut subs) = self.subscribers.get_mut(&run_id) {
            // A subscriber past its deadline (channel full) is dropped
            // rather than allowed to back-pressure the whole run.
            subs.retain(|tx| tx.try_send(event.clone()).is_ok());
        }
    }

    fn spawn_worker(self: Arc<Self>, run_id: RunId) {
        tokio::spawn(async move {
            let worker = self.clone();
            if let Err(e) = worker.run_worker(run_id).await {
                error!(%run_id, error = %e, "worker process failed");
                let _ = self.store.update(run_id, |run| {
                    run.record_error(e.to_string());
                    run.transition(RunStatus::Failed)
                });
            }
            self.admit_next();
        });
    }

    fn admit_next(self: Arc<Self>) {
        if self.store.count_active() >= self.config.max_concurrent_runs {
            return;
        }
        let next = self.overflow.lock().pop_front();
        if let Some(run_id) = next {
            self.spawn_worker(run_id);
        }
    }

    async fn run_worker(self: Arc<Self>, run_id: RunId) -> GbResult<()> {
        let run = self.store.get(run_id)?;
        let config: RunConfig = RunConfig::parse(run.config.clone(), false)?;
        self.store.update(run_id, |r| r.transition(RunStatus::Running))?;

        let mut child = Command::new(&self.config.worker_binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| GbError::Orchestrator(OrchestratorError::WorkerProcess { message: e.to_string() }))?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        let request = WorkerRequest { run_id: run_id.to_string(), config };
        ipc::write_frame_async(&mut stdin, &request).await?;
        drop(stdin);

        let stdout = child.stdout.take().expect("stdout was piped");
        self.handles.insert(run_id, RunHandle { child: Mutex::new(Some(child)) });

        let mut reader = BufReader::new(stdout);
        loop {
            let message: Option<WorkerMessage> = ipc::read_frame_async(&mut reader).await?;
            match message {
                None => break,
                Some(WorkerMessage::Event(event)) => self.push_event(run_id, event),
                Some(WorkerMessage::Finished { bars_processed }) => {
                    info!(%run_id, bars_processed, "run finished");
                    self.store.update(run_id, |r| {
                        r.record_progress(1.0);
                        r.transition(RunStatus::Succeeded)
                    })?;
                }
                Some(WorkerMessage::Failed { message }) => {
                    warn!(%run_id, %message, "run failed");
                    self.store.update(run_id, |r| {
                        r.record_error(message);
                        r.transition(RunStatus::Failed)
                    })?;
                }
            }
        }

        if let Some(handle) = self.handles.get(&run_id) {
            if let Some(mut child) = handle.child.lock().take() {
                let _ = child.wait().await;
            }
        }
        self.handles.remove(&run_id);

        let final_status = self.store.get(run_id)?.status;
        if !final_status.is_terminal() {
            // The worker exited without a final message (crash, kill signal).
            self.store.update(run_id, |r| {
                r.record_error("worker exited without reporting a final status");
                r.transition(RunStatus::Failed)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config_value() -> serde_json::Value {
        serde_json::json!({
            "name": "demo",
            "data_feed": { "type": "in_memory", "symbol": "AAPL", "bars": [] },
        })
    }

    #[test]
    fn submit_rejects_invalid_config() {
        let store = Arc::new(RunStore::in_memory());
        let manager = RunManager::new(store, RunManagerConfig::default());
        let result = manager.submit("demo", serde_json::json!({ "name": "demo" }), false);
        assert!(result.is_err());
    }

    #[test]
    fn submit_journals_a_pending_run() {
        let store = Arc::new(RunStore::in_memory());
        let manager = RunManager::new(store.clone(), RunManagerConfig::default());
        let run_id = manager.submit("demo", sample_config_value(), false).unwrap();
        assert_eq!(store.get(run_id).unwrap().status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn stream_before_any_events_returns_an_empty_backlog() {
        let store = Arc::new(RunStore::in_memory());
        let manager = RunManager::new(store, RunManagerConfig::default());
        let run_id = manager.submit("demo", sample_config_value(), false).unwrap();
        let mut rx = manager.stream(run_id).unwrap();
        manager.push_event(
            run_id,
            Event {
                kind: gb_types::EventKind::Metrics,
                seq: 0,
                occurred_at: Utc::now(),
                run_id: run_id.to_string(),
                symbol_seq: None,
                trace_id: uuid::Uuid::new_v4(),
                payload: gb_types::EventPayload::Metrics(gb_types::MetricsEvent {
                    equity: Default::default(),
                    cash: Default::default(),
                    realized_pnl: Default::default(),
                    unrealized_pnl: Default::default(),
                    holdings: Default::default(),
                }),
            },
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.seq, 0);
    }

    #[test]
    fn cancel_of_an_unstarted_run_transitions_it_to_canceled() {
        let store = Arc::new(RunStore::in_memory());
        let manager = RunManager::new(store.clone(), RunManagerConfig::default());
        let run_id = manager.submit("demo", sample_config_value(), false).unwrap();
        manager.cancel(run_id).unwrap();
        assert_eq!(store.get(run_id).unwrap().status, RunStatus::Canceled);
    }
}
