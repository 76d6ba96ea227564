//! The event envelope shared by every message flowing through the kernel's bus.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::market::{Bar, Symbol};
use crate::orders::{Fill, Order};

/// Discriminator used by the bus to route an event to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Market,
    Signal,
    Order,
    Fill,
    Metrics,
    RiskRejection,
}

/// Direction of a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Long,
    Short,
    Exit,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalDirection::Long => "long",
            SignalDirection::Short => "short",
            SignalDirection::Exit => "exit",
        };
        write!(f, "{s}")
    }
}

/// A strategy-emitted trading intent, not yet sized or risk-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub strategy_id: String,
    pub symbol: Symbol,
    pub direction: SignalDirection,
    /// Normalized conviction in `[0, 1]`. A strength of zero never produces an order.
    pub strength: Decimal,
    pub reason: String,
    pub target_weight: Option<Decimal>,
}

/// A snapshot of portfolio state published after every fill is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub equity: Decimal,
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub holdings: HashMap<Symbol, Decimal>,
}

/// Published by the portfolio when the risk chain rejects an order and
/// notifications are active; carries enough context for the signal bridge
/// and reporters to render a human-readable alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRejectionEvent {
    pub strategy_id: String,
    pub symbol: Symbol,
    pub reason: String,
    pub rule: String,
}

/// The payload carried by one envelope, tagged by [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Market(Bar),
    Signal(SignalEvent),
    Order(Order),
    Fill(Fill),
    Metrics(MetricsEvent),
    RiskRejection(RiskRejectionEvent),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Market(_) => EventKind::Market,
            EventPayload::Signal(_) => EventKind::Signal,
            EventPayload::Order(_) => EventKind::Order,
            EventPayload::Fill(_) => EventKind::Fill,
            EventPayload::Metrics(_) => EventKind::Metrics,
            EventPayload::RiskRejection(_) => EventKind::RiskRejection,
        }
    }
}

/// One in-bus message: a typed payload plus the envelope fields every
/// message carries regardless of kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Monotonically increasing across the whole run, assigned on publish.
    pub seq: u64,
    pub occurred_at: DateTime<Utc>,
    pub run_id: String,
    /// Per-symbol sequence, set for market/order/fill events; `None` otherwise.
    pub symbol_seq: Option<u64>,
    pub trace_id: Uuid,
    pub payload: EventPayload,
}

impl Event {
    pub fn symbol(&self) -> Option<&Symbol> {
        match &self.payload {
            EventPayload::Market(bar) => Some(&bar.symbol),
            EventPayload::Signal(s) => Some(&s.symbol),
            EventPayload::Order(o) => Some(&o.symbol),
            EventPayload::Fill(f) => Some(&f.symbol),
            EventPayload::RiskRejection(r) => Some(&r.symbol),
            EventPayload::Metrics(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar::new(
            Symbol::equity("AAPL"),
            Utc::now(),
            Decimal::from(100),
            Decimal::from(101),
            Decimal::from(99),
            Decimal::from(100),
            Decimal::from(1000),
            crate::market::Resolution::Day,
        )
    }

    #[test]
    fn payload_kind_matches_envelope_tag() {
        let payload = EventPayload::Market(sample_bar());
        assert_eq!(payload.kind(), EventKind::Market);
    }

    #[test]
    fn event_symbol_extracts_from_payload() {
        let event = Event {
            kind: EventKind::Market,
            seq: 0,
            occurred_at: Utc::now(),
            run_id: "run-1".into(),
            symbol_seq: Some(0),
            trace_id: Uuid::new_v4(),
            payload: EventPayload::Market(sample_bar()),
        };
        assert_eq!(event.symbol().unwrap().symbol, "AAPL");
    }

    #[test]
    fn metrics_event_has_no_symbol() {
        let event = Event {
            kind: EventKind::Metrics,
            seq: 1,
            occurred_at: Utc::now(),
            run_id: "run-1".into(),
            symbol_seq: None,
            trace_id: Uuid::new_v4(),
            payload: EventPayload::Metrics(MetricsEvent {
                equity: Decimal::from(100_000),
                cash: Decimal::from(100_000),
                realized_pnl: Decimal::ZERO,
                unrealized_pnl: Decimal::ZERO,
                holdings: HashMap::new(),
            }),
        };
        assert!(event.symbol().is_none());
    }
}
