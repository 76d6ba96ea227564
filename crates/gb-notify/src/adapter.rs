//! Pluggable transport to an external chat channel.
//!
//! The trait shape is grounded on `gb-live::broker::{Broker, BrokerCallback}`:
//! an `async_trait` object-safe interface with a small, closed operation set.
//! The reference webhook transport reuses `reqwest`, already a dependency of
//! `gb-data`'s REST provider.

use async_trait::async_trait;
use gb_types::NotificationIntent;
use std::time::Duration;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Ok,
    /// Network error, rate limit, 5xx: worth retrying with backoff.
    Retryable { reason: String, retry_after: Option<Duration> },
    /// 4xx validation, unknown recipient: retrying will never succeed.
    Permanent { reason: String },
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send(&self, intent: &NotificationIntent) -> SendOutcome;

    /// Stable name used in logs and metrics; not the destination itself.
    fn name(&self) -> &str;
}

/// Generic webhook transport: POSTs the intent's payload, under a per-intent
/// template keyed by `intent_type`, to a fixed URL.
pub struct WebhookChannelAdapter {
    name: String,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookChannelAdapter {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self { name: name.into(), url: url.into(), client: reqwest::Client::new(), timeout }
    }

    fn render(&self, intent: &NotificationIntent) -> serde_json::Value {
        serde_json::json!({
            "intent_id": intent.id,
            "intent_type": intent.intent_type,
            "severity": intent.severity,
            "dedupe_key": intent.dedupe_key,
            "payload": intent.payload,
        })
    }
}

#[async_trait]
impl ChannelAdapter for WebhookChannelAdapter {
    async fn send(&self, intent: &NotificationIntent) -> SendOutcome {
        let body = self.render(intent);
        let result = self.client.post(&self.url).json(&body).timeout(self.timeout).send().await;

        match result {
            Ok(response) if response.status().is_success() => SendOutcome::Ok,
            Ok(response) if response.status().is_client_error() => {
                SendOutcome::Permanent { reason: format!("webhook rejected with {}", response.status()) }
            }
            Ok(response) => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                SendOutcome::Retryable { reason: format!("webhook returned {}", response.status()), retry_after }
            }
            Err(error) if error.is_timeout() => {
                SendOutcome::Retryable { reason: format!("webhook timed out: {error}"), retry_after: None }
            }
            Err(error) => SendOutcome::Retryable { reason: format!("webhook request failed: {error}"), retry_after: None },
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Discards every intent as delivered. Used by tests and dry-run configs.
#[derive(Debug, Default)]
pub struct NullChannelAdapter;

#[async_trait]
impl ChannelAdapter for NullChannelAdapter {
    async fn send(&self, _intent: &NotificationIntent) -> SendOutcome {
        SendOutcome::Ok
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::{IntentSeverity, IntentType};

    #[tokio::test]
    async fn null_adapter_always_succeeds() {
        let adapter = NullChannelAdapter;
        let intent = NotificationIntent::new(
            "k1",
            IntentType::StrategySignal,
            IntentSeverity::Info,
            serde_json::json!({}),
            "chat-main",
        );
        assert!(matches!(adapter.send(&intent).await, SendOutcome::Ok));
        assert_eq!(adapter.name(), "null");
    }
}
