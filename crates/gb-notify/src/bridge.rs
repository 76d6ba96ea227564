//! Stateless mapping from kernel events to durable [`NotificationIntent`]s.
//!
//! The bridge never touches the outbox directly; it is a pure function of
//! one event plus its own config, matching `gb-risk::alerts::RiskAlert::new`'s
//! stable-id-plus-severity-plus-kind shape one layer up the pipeline.

use chrono::{DateTime, Utc};
use gb_types::{Event, EventPayload, IntentSeverity, IntentType, NotificationIntent};

#[derive(Debug, Clone)]
pub struct SignalBridgeConfig {
    pub min_severity: IntentSeverity,
    /// Width of the dedupe bucket, in seconds. Bucketing is on the event's
    /// `occurred_at`, not wall-clock enqueue time, so replaying a recorded
    /// event log reproduces identical dedupe keys regardless of when it is
    /// replayed.
    pub dedupe_ttl_seconds: i64,
    pub default_channel: String,
}

impl Default for SignalBridgeConfig {
    fn default() -> Self {
        Self { min_severity: IntentSeverity::Info, dedupe_ttl_seconds: 300, default_channel: "default".into() }
    }
}

pub struct SignalBridge {
    config: SignalBridgeConfig,
}

impl SignalBridge {
    pub fn new(config: SignalBridgeConfig) -> Self {
        Self { config }
    }

    /// Maps one bus event to an intent, or `None` if the event kind never
    /// produces a notification or its severity falls below the configured
    /// floor.
    pub fn map_event(&self, event: &Event) -> Option<NotificationIntent> {
        let (intent_type, severity, dedupe_key, payload) = match &event.payload {
            EventPayload::Signal(signal) => {
                let bucket = bucket_ts(event.occurred_at, self.config.dedupe_ttl_seconds);
                let key = format!(
                    "{}:{}:{}:{}:{}",
                    event.run_id, signal.strategy_id, signal.symbol, bucket, signal.direction
                );
                let payload = serde_json::json!({
                    "strategy_id": signal.strategy_id,
                    "symbol": signal.symbol.symbol,
                    "direction": signal.direction.to_string(),
                    "strength": signal.strength,
                    "reason": signal.reason,
                });
                (IntentType::StrategySignal, IntentSeverity::Info, key, payload)
            }
            EventPayload::Fill(fill) => {
                let payload = serde_json::json!({
                    "order_id": fill.order_id,
                    "symbol": fill.symbol.symbol,
                    "side": format!("{:?}", fill.side),
                    "quantity": fill.quantity,
                    "price": fill.price,
                    "commission": fill.commission,
                    "strategy_id": fill.strategy_id,
                });
                (IntentType::FillReport, IntentSeverity::Info, fill.id.to_string(), payload)
            }
            EventPayload::RiskRejection(rejection) => {
                let payload = serde_json::json!({
                    "strategy_id": rejection.strategy_id,
                    "symbol": rejection.symbol.symbol,
                    "reason": rejection.reason,
                    "rule": rejection.rule,
                });
                let key = format!("{}:risk:{}", event.run_id, event.seq);
                (IntentType::RiskAlert, IntentSeverity::Warning, key, payload)
            }
            EventPayload::Market(_) | EventPayload::Order(_) | EventPayload::Metrics(_) => return None,
        };

        if severity < self.config.min_severity {
            return None;
        }

        Some(NotificationIntent::new(dedupe_key, intent_type, severity, payload, self.config.default_channel.clone()))
    }

    /// Builds a `system_alert` intent for conditions the bus never sees
    /// directly: a feed gap, a heartbeat timeout, a worker crash.
    pub fn system_alert(&self, run_id: &str, reason: impl Into<String>) -> NotificationIntent {
        let reason = reason.into();
        let key = format!("{run_id}:system:{reason}");
        NotificationIntent::new(
            key,
            IntentType::SystemAlert,
            IntentSeverity::Warning,
            serde_json::json!({ "reason": reason }),
            self.config.default_channel.clone(),
        )
    }
}

fn bucket_ts(occurred_at: DateTime<Utc>, ttl_seconds: i64) -> i64 {
    if ttl_seconds <= 0 {
        return occurred_at.timestamp();
    }
    occurred_at.timestamp() / ttl_seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gb_types::{EventKind, SignalDirection, SignalEvent, Symbol};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn signal_event(occurred_at: DateTime<Utc>, seq: u64) -> Event {
        Event {
            kind: EventKind::Signal,
            seq,
            occurred_at,
            run_id: "run-1".into(),
            symbol_seq: None,
            trace_id: Uuid::new_v4(),
            payload: EventPayload::Signal(SignalEvent {
                strategy_id: "ma".into(),
                symbol: Symbol::equity("AAPL"),
                direction: SignalDirection::Long,
                strength: dec!(1),
                reason: "crossover".into(),
                target_weight: None,
            }),
        }
    }

    #[test]
    fn signal_maps_to_strategy_signal_intent() {
        let bridge = SignalBridge::new(SignalBridgeConfig::default());
        let intent = bridge.map_event(&signal_event(Utc::now(), 0)).unwrap();
        assert_eq!(intent.intent_type, IntentType::StrategySignal);
    }

    #[test]
    fn dedupe_key_is_stable_across_bucket_on_occurred_at_not_wall_clock() {
        let bridge = SignalBridge::new(SignalBridgeConfig::default());
        let occurred_at = Utc::now();
        let a = bridge.map_event(&signal_event(occurred_at, 0)).unwrap();
        let b = bridge.map_event(&signal_event(occurred_at, 1)).unwrap();
        assert_eq!(a.dedupe_key, b.dedupe_key);
    }

    #[test]
    fn dedupe_key_changes_once_bucket_boundary_is_crossed() {
        let bridge = SignalBridge::new(SignalBridgeConfig {
            dedupe_ttl_seconds: 60,
            ..SignalBridgeConfig::default()
        });
        let t0 = Utc::now();
        let a = bridge.map_event(&signal_event(t0, 0)).unwrap();
        let b = bridge.map_event(&signal_event(t0 + Duration::seconds(120), 1)).unwrap();
        assert_ne!(a.dedupe_key, b.dedupe_key);
    }

    #[test]
    fn market_and_order_and_metrics_events_produce_no_intent() {
        use gb_types::{Bar, Resolution};
        let bridge = SignalBridge::new(SignalBridgeConfig::default());
        let event = Event {
            kind: EventKind::Market,
            seq: 0,
            occurred_at: Utc::now(),
            run_id: "run-1".into(),
            symbol_seq: None,
            trace_id: Uuid::new_v4(),
            payload: EventPayload::Market(Bar::new(
                Symbol::equity("AAPL"),
                Utc::now(),
                dec!(100),
                dec!(101),
                dec!(99),
                dec!(100),
                dec!(1000),
                Resolution::Day,
            )),
        };
        assert!(bridge.map_event(&event).is_none());
    }

    #[test]
    fn min_severity_filters_out_low_severity_intents() {
        let bridge = SignalBridge::new(SignalBridgeConfig {
            min_severity: IntentSeverity::Critical,
            ..SignalBridgeConfig::default()
        });
        assert!(bridge.map_event(&signal_event(Utc::now(), 0)).is_none());
    }
}
