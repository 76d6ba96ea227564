//! Notification intents: the durable unit the outbox tracks from creation to
//! terminal delivery outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type IntentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentType {
    StrategySignal,
    FillReport,
    RiskAlert,
    SystemAlert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentSeverity {
    Info,
    Warning,
    Critical,
}

/// Status lifecycle: `Pending -> Leased -> (Sent | Pending via lease release
/// | DeadLetter)`. `Failed` is never a persisted resting state produced by
/// this implementation's `mark_failed` (it always resolves immediately to
/// `Pending` or `DeadLetter`); it is kept in the enum because the data model
/// names it explicitly and an adapter may want to surface it transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    Pending,
    Leased,
    Sent,
    Failed,
    DeadLetter,
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Leased => "leased",
            IntentStatus::Sent => "sent",
            IntentStatus::Failed => "failed",
            IntentStatus::DeadLetter => "dead_letter",
        };
        write!(f, "{s}")
    }
}

/// A single durable delivery intent tracked by the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: IntentId,
    pub dedupe_key: String,
    pub intent_type: IntentType,
    pub severity: IntentSeverity,
    pub payload: serde_json::Value,
    pub target_channel: String,
    pub status: IntentStatus,
    pub attempt_count: u32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub leased_until: Option<DateTime<Utc>>,
}

impl NotificationIntent {
    pub fn new(
        dedupe_key: impl Into<String>,
        intent_type: IntentType,
        severity: IntentSeverity,
        payload: serde_json::Value,
        target_channel: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dedupe_key: dedupe_key.into(),
            intent_type,
            severity,
            payload,
            target_channel: target_channel.into(),
            status: IntentStatus::Pending,
            attempt_count: 0,
            next_retry_at: now,
            last_error: None,
            created_at: now,
            leased_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_intent_starts_pending_with_zero_attempts() {
        let intent = NotificationIntent::new(
            "run:strat:AAPL:100:long",
            IntentType::StrategySignal,
            IntentSeverity::Info,
            serde_json::json!({"reason": "crossover"}),
            "chat-main",
        );
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.attempt_count, 0);
        assert!(intent.leased_until.is_none());
    }

    #[test]
    fn severity_ordering_is_info_lt_warning_lt_critical() {
        assert!(IntentSeverity::Info < IntentSeverity::Warning);
        assert!(IntentSeverity::Warning < IntentSeverity::Critical);
    }
}
