//! Durable notification plane: bridges kernel events into `NotificationIntent`s,
//! queues them in a transactional outbox, and delivers them at-least-once
//! through a pluggable channel adapter.

pub mod adapter;
pub mod bridge;
pub mod dispatcher;
pub mod outbox;

pub use adapter::{ChannelAdapter, NullChannelAdapter, SendOutcome, WebhookChannelAdapter};
pub use bridge::{SignalBridge, SignalBridgeConfig};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use outbox::{Outbox, OutboxConfig, OutboxMetrics};
