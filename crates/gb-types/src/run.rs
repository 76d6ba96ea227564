//! The `Run` record: the orchestrator's durable unit of work.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{GbError, GbResult, OrchestratorError};
use crate::event::Event;

pub type RunId = Uuid;

/// Lifecycle status of a run. Transitions are monotonic: `Pending -> Running
/// -> {Succeeded, Failed, Canceled}`. Once terminal, a run is immutable
/// except for retention eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled)
    }

    /// Whether `self -> next` is a legal transition under the monotonic
    /// lifecycle: `Pending -> Running -> terminal`.
    fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Pending, RunStatus::Canceled) => true,
            (RunStatus::Running, RunStatus::Succeeded) => true,
            (RunStatus::Running, RunStatus::Failed) => true,
            (RunStatus::Running, RunStatus::Canceled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// A durable record of one backtest or live-strategy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub name: String,
    /// Opaque, already-validated config document; the orchestrator never
    /// interprets its shape beyond what `RunConfig` requires.
    pub config: serde_json::Value,
    pub status: RunStatus,
    /// Fraction of the feed consumed so far, in `[0, 1]`.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Bounded ring buffer of the most recent events, for replay to late
    /// subscribers that join mid-run.
    #[serde(skip)]
    pub recent_events: VecDeque<Event>,
    pub recent_events_capacity: usize,
}

impl Run {
    pub fn new(name: impl Into<String>, config: serde_json::Value, ring_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config,
            status: RunStatus::Pending,
            progress: 0.0,
            created_at: now,
            updated_at: now,
            last_error: None,
            recent_events: VecDeque::with_capacity(ring_capacity),
            recent_events_capacity: ring_capacity,
        }
    }

    /// Validates and applies a status transition, stamping `updated_at`.
    pub fn transition(&mut self, next: RunStatus) -> GbResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(GbError::Orchestrator(OrchestratorError::InvalidStatusTransition {
                run_id: self.id.to_string(),
                status: self.status.to_string(),
                attempted: next.to_string(),
            }));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
        self.updated_at = Utc::now();
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Appends to the ring buffer, evicting the oldest entry once at capacity.
    pub fn push_event(&mut self, event: Event) {
        if self.recent_events.len() >= self.recent_events_capacity && self.recent_events_capacity > 0 {
            self.recent_events.pop_front();
        }
        if self.recent_events_capacity > 0 {
            self.recent_events.push_back(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_running_to_succeeded_is_legal() {
        let mut run = Run::new("test", serde_json::json!({}), 8);
        assert!(run.transition(RunStatus::Running).is_ok());
        assert!(run.transition(RunStatus::Succeeded).is_ok());
        assert!(run.status.is_terminal());
    }

    #[test]
    fn terminal_status_rejects_further_transitions() {
        let mut run = Run::new("test", serde_json::json!({}), 8);
        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::Failed).unwrap();
        assert!(run.transition(RunStatus::Running).is_err());
    }

    #[test]
    fn pending_cannot_jump_straight_to_succeeded() {
        let mut run = Run::new("test", serde_json::json!({}), 8);
        assert!(run.transition(RunStatus::Succeeded).is_err());
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        use crate::event::{EventKind, EventPayload, MetricsEvent};
        let mut run = Run::new("test", serde_json::json!({}), 2);
        for i in 0..5u64 {
            run.push_event(Event {
                kind: EventKind::Metrics,
                seq: i,
                occurred_at: Utc::now(),
                run_id: run.id.to_string(),
                symbol_seq: None,
                trace_id: Uuid::new_v4(),
                payload: EventPayload::Metrics(MetricsEvent {
                    equity: Default::default(),
                    cash: Default::default(),
                    realized_pnl: Default::default(),
                    unrealized_pnl: Default::default(),
                    holdings: Default::default(),
                }),
            });
        }
        assert_eq!(run.recent_events.len(), 2);
        assert_eq!(run.recent_events.front().unwrap().seq, 3);
        assert_eq!(run.recent_events.back().unwrap().seq, 4);
    }
}
