//! The transactional outbox: a durable, indexed queue of [`NotificationIntent`]s
//! with lease/retry/dead-letter semantics.
//!
//! Grounded on `gb-risk::monitor::RiskMonitor`'s update-then-emit discipline
//! one layer down, and on the journaled-append pattern used elsewhere in the
//! workspace for durable indices. The in-memory index is a
//! `parking_lot::Mutex`-guarded map, matching the workspace's existing
//! synchronization primitive of choice; an optional append-only JSON-lines
//! journal backs it for crash recovery.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use gb_types::{GbError, GbResult, IntentId, IntentStatus, NotificationIntent, NotifyError};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Attempts (including the first) tolerated before an intent moves to
    /// `dead_letter`.
    pub max_attempts: u32,
    pub base_backoff_seconds: i64,
    pub max_backoff_seconds: i64,
    /// Window within which a duplicate dedupe key is collapsed into the
    /// existing pending/leased intent rather than inserted anew.
    pub dedupe_ttl_seconds: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self { max_attempts: 5, base_backoff_seconds: 2, max_backoff_seconds: 300, dedupe_ttl_seconds: 300 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxMetrics {
    pub pending: usize,
    pub leased: usize,
    pub sent: usize,
    pub dead_letter: usize,
    pub oldest_pending_age_seconds: Option<i64>,
}

/// One line of the durable journal: the full intent snapshot after a mutation.
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    intent: NotificationIntent,
}

struct OutboxInner {
    intents: HashMap<IntentId, NotificationIntent>,
    journal: Option<File>,
}

impl OutboxInner {
    fn append_journal(&mut self, intent: &NotificationIntent) -> GbResult<()> {
        let Some(file) = self.journal.as_mut() else { return Ok(()) };
        let line = serde_json::to_string(&JournalRecord { intent: intent.clone() })?;
        writeln!(file, "{line}").map_err(GbError::Io)?;
        file.flush().map_err(GbError::Io)?;
        file.sync_data().map_err(GbError::Io)?;
        Ok(())
    }

    fn pending_with_same_dedupe_key(&self, dedupe_key: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.intents.values().any(|existing| {
            existing.dedupe_key == dedupe_key
                && matches!(existing.status, IntentStatus::Pending | IntentStatus::Leased)
                && now.signed_duration_since(existing.created_at) <= ttl
        })
    }
}

/// A durable queue of notification intents. One outbox per notification
/// plane; shared across dispatcher workers via `&Outbox` (interior mutability).
pub struct Outbox {
    inner: Mutex<OutboxInner>,
    config: OutboxConfig,
}

impl Outbox {
    pub fn new(config: OutboxConfig) -> Self {
        Self { inner: Mutex::new(OutboxInner { intents: HashMap::new(), journal: None }), config }
    }

    /// Opens (or creates) a JSON-lines journal at `path` and replays it to
    /// rebuild the in-memory index, then keeps the file open for further
    /// appends. Call `recover` afterward to release any leases that expired
    /// while the process was down.
    pub fn open_journaled(path: impl AsRef<Path>, config: OutboxConfig) -> GbResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut intents = HashMap::new();
        if path.exists() {
            let file = File::open(&path).map_err(GbError::Io)?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(GbError::Io)?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: JournalRecord = serde_json::from_str(&line)?;
                intents.insert(record.intent.id, record.intent);
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).map_err(GbError::Io)?;
        info!(path = %path.display(), recovered = intents.len(), "outbox journal replayed");
        Ok(Self { inner: Mutex::new(OutboxInner { intents, journal: Some(file) }), config })
    }

    /// Inserts `intent` as `pending` unless a pending/leased intent with the
    /// same dedupe key was created within the TTL, in which case the call is
    /// a no-op. Returns whether it was inserted.
    pub fn enqueue(&self, intent: NotificationIntent) -> GbResult<bool> {
        let ttl = Duration::seconds(self.config.dedupe_ttl_seconds.max(0));
        let mut inner = self.inner.lock();
        if inner.pending_with_same_dedupe_key(&intent.dedupe_key, ttl, Utc::now()) {
            return Ok(false);
        }
        inner.append_journal(&intent)?;
        inner.intents.insert(intent.id, intent);
        Ok(true)
    }

    /// Atomically selects up to `batch_size` of the oldest due `pending`
    /// intents, marks them `leased`, and returns them. Two callers never
    /// observe overlapping leases: the whole operation holds the mutex.
    pub fn lease(&self, batch_size: usize, lease_duration: Duration) -> GbResult<Vec<NotificationIntent>> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut due: Vec<IntentId> = inner
            .intents
            .values()
            .filter(|intent| intent.status == IntentStatus::Pending && intent.next_retry_at <= now)
            .map(|intent| intent.id)
            .collect();
        due.sort_by_key(|id| inner.intents[id].created_at);
        due.truncate(batch_size);

        let mut leased = Vec::with_capacity(due.len());
        for id in due {
            let intent = inner.intents.get_mut(&id).expect("id came from the same map");
            intent.status = IntentStatus::Leased;
            intent.leased_until = Some(now + lease_duration);
            let snapshot = intent.clone();
            inner.append_journal(&snapshot)?;
            leased.push(snapshot);
        }
        Ok(leased)
    }

    pub fn mark_sent(&self, intent_id: IntentId) -> GbResult<()> {
        let mut inner = self.inner.lock();
        let intent = inner
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| GbError::Notify(NotifyError::IntentNotFound { intent_id: intent_id.to_string() }))?;
        if intent.status == IntentStatus::Sent {
            return Ok(());
        }
        intent.status = IntentStatus::Sent;
        intent.leased_until = None;
        let snapshot = intent.clone();
        inner.append_journal(&snapshot)
    }

    /// Increments `attempt_count`; if still under `max_attempts`, computes an
    /// exponential backoff with jitter and returns the intent to `pending`;
    /// otherwise transitions it to `dead_letter`.
    pub fn mark_failed(&self, intent_id: IntentId, error: impl Into<String>) -> GbResult<()> {
        let error = error.into();
        let mut inner = self.inner.lock();
        let config = self.config.clone();
        let intent = inner
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| GbError::Notify(NotifyError::IntentNotFound { intent_id: intent_id.to_string() }))?;

        intent.attempt_count += 1;
        intent.last_error = Some(error.clone());
        intent.leased_until = None;

        if intent.attempt_count >= config.max_attempts {
            intent.status = IntentStatus::DeadLetter;
            warn!(intent_id = %intent_id, attempts = intent.attempt_count, %error, "intent moved to dead letter");
        } else {
            intent.status = IntentStatus::Pending;
            intent.next_retry_at = Utc::now() + backoff_with_jitter(&config, intent.attempt_count);
        }
        let snapshot = intent.clone();
        inner.append_journal(&snapshot)
    }

    /// Permanent failure override: skips backoff, dead-letters immediately
    /// regardless of `attempt_count`. Used by the dispatcher for 4xx-style
    /// non-retryable channel errors.
    pub fn mark_dead_letter(&self, intent_id: IntentId, error: impl Into<String>) -> GbResult<()> {
        let mut inner = self.inner.lock();
        let intent = inner
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| GbError::Notify(NotifyError::IntentNotFound { intent_id: intent_id.to_string() }))?;
        intent.attempt_count += 1;
        intent.last_error = Some(error.into());
        intent.leased_until = None;
        intent.status = IntentStatus::DeadLetter;
        let snapshot = intent.clone();
        inner.append_journal(&snapshot)
    }

    /// After `mark_failed` computes a backoff, pushes `next_retry_at` out
    /// further if the channel indicated its own back-off window (e.g. a
    /// rate-limit response). Never pulls it earlier.
    pub fn honor_retry_not_before(&self, intent_id: IntentId, not_before: DateTime<Utc>) -> GbResult<()> {
        let mut inner = self.inner.lock();
        let intent = inner
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| GbError::Notify(NotifyError::IntentNotFound { intent_id: intent_id.to_string() }))?;
        if intent.next_retry_at < not_before {
            intent.next_retry_at = not_before;
        }
        let snapshot = intent.clone();
        inner.append_journal(&snapshot)
    }

    /// Returns any `leased` intent whose lease has expired to `pending`,
    /// preserving `attempt_count`. Call once at startup and periodically from
    /// a recovery task.
    pub fn recover(&self) -> GbResult<usize> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let expired: Vec<IntentId> = inner
            .intents
            .values()
            .filter(|intent| intent.status == IntentStatus::Leased && intent.leased_until.is_some_and(|until| until < now))
            .map(|intent| intent.id)
            .collect();

        let count = expired.len();
        for id in expired {
            let intent = inner.intents.get_mut(&id).expect("id came from the same map");
            intent.status = IntentStatus::Pending;
            intent.leased_until = None;
            let snapshot = intent.clone();
            inner.append_journal(&snapshot)?;
        }
        if count > 0 {
            info!(recovered = count, "outbox recovered expired leases");
        }
        Ok(count)
    }

    pub fn metrics(&self) -> OutboxMetrics {
        let inner = self.inner.lock();
        let now = Utc::now();
        let mut metrics = OutboxMetrics::default();
        for intent in inner.intents.values() {
            match intent.status {
                IntentStatus::Pending => {
                    metrics.pending += 1;
                    let age = now.signed_duration_since(intent.created_at).num_seconds();
                    metrics.oldest_pending_age_seconds =
                        Some(metrics.oldest_pending_age_seconds.map_or(age, |existing| existing.max(age)));
                }
                IntentStatus::Leased => metrics.leased += 1,
                IntentStatus::Sent => metrics.sent += 1,
                IntentStatus::DeadLetter => metrics.dead_letter += 1,
                IntentStatus::Failed => {}
            }
        }
        metrics
    }

    #[cfg(test)]
    fn get(&self, id: IntentId) -> NotificationIntent {
        self.inner.lock().intents.get(&id).cloned().unwrap()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().intents.len()
    }
}

fn backoff_with_jitter(config: &OutboxConfig, attempt_count: u32) -> Duration {
    let exp = config.base_backoff_seconds.saturating_mul(1i64 << attempt_count.min(20));
    let capped = exp.min(config.max_backoff_seconds).max(config.base_backoff_seconds);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4 + 1);
    Duration::seconds(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::{IntentSeverity, IntentType};

    fn sample_intent(dedupe_key: &str) -> NotificationIntent {
        NotificationIntent::new(
            dedupe_key,
            IntentType::StrategySignal,
            IntentSeverity::Info,
            serde_json::json!({}),
            "chat-main",
        )
    }

    #[test]
    fn enqueue_inserts_new_intent() {
        let outbox = Outbox::new(OutboxConfig::default());
        assert!(outbox.enqueue(sample_intent("k1")).unwrap());
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn duplicate_dedupe_key_within_ttl_is_a_no_op() {
        let outbox = Outbox::new(OutboxConfig::default());
        assert!(outbox.enqueue(sample_intent("k1")).unwrap());
        assert!(!outbox.enqueue(sample_intent("k1")).unwrap());
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn lease_marks_intents_leased_and_excludes_them_from_next_lease() {
        let outbox = Outbox::new(OutboxConfig::default());
        outbox.enqueue(sample_intent("k1")).unwrap();
        let leased = outbox.lease(10, Duration::seconds(30)).unwrap();
        assert_eq!(leased.len(), 1);
        assert!(outbox.lease(10, Duration::seconds(30)).unwrap().is_empty());
    }

    #[test]
    fn mark_sent_is_idempotent() {
        let outbox = Outbox::new(OutboxConfig::default());
        let intent = sample_intent("k1");
        let id = intent.id;
        outbox.enqueue(intent).unwrap();
        outbox.lease(10, Duration::seconds(30)).unwrap();
        outbox.mark_sent(id).unwrap();
        outbox.mark_sent(id).unwrap();
        assert_eq!(outbox.get(id).status, IntentStatus::Sent);
    }

    #[test]
    fn mark_failed_retries_until_max_attempts_then_dead_letters() {
        let outbox = Outbox::new(OutboxConfig { max_attempts: 2, ..OutboxConfig::default() });
        let intent = sample_intent("k1");
        let id = intent.id;
        outbox.enqueue(intent).unwrap();

        outbox.lease(10, Duration::seconds(30)).unwrap();
        outbox.mark_failed(id, "first failure").unwrap();
        assert_eq!(outbox.get(id).status, IntentStatus::Pending);
        assert_eq!(outbox.get(id).attempt_count, 1);

        // Force the retry to be due now for the test's sake.
        {
            let mut inner = outbox.inner.lock();
            inner.intents.get_mut(&id).unwrap().next_retry_at = Utc::now() - Duration::seconds(1);
        }
        outbox.lease(10, Duration::seconds(30)).unwrap();
        outbox.mark_failed(id, "second failure").unwrap();
        assert_eq!(outbox.get(id).status, IntentStatus::DeadLetter);
    }

    #[test]
    fn recover_returns_expired_leases_to_pending_preserving_attempt_count() {
        let outbox = Outbox::new(OutboxConfig::default());
        let intent = sample_intent("k1");
        let id = intent.id;
        outbox.enqueue(intent).unwrap();
        outbox.lease(10, Duration::seconds(30)).unwrap();
        outbox.mark_failed(id, "fail").unwrap();

        {
            let mut inner = outbox.inner.lock();
            let intent = inner.intents.get_mut(&id).unwrap();
            intent.status = IntentStatus::Leased;
            intent.leased_until = Some(Utc::now() - Duration::seconds(1));
        }

        let recovered = outbox.recover().unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(outbox.get(id).status, IntentStatus::Pending);
        assert_eq!(outbox.get(id).attempt_count, 1);
    }

    #[test]
    fn journaled_outbox_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");

        let id = {
            let outbox = Outbox::open_journaled(&path, OutboxConfig::default()).unwrap();
            let intent = sample_intent("k1");
            let id = intent.id;
            outbox.enqueue(intent).unwrap();
            outbox.lease(10, Duration::seconds(30)).unwrap();
            outbox.mark_sent(id).unwrap();
            id
        };

        let reopened = Outbox::open_journaled(&path, OutboxConfig::default()).unwrap();
        assert_eq!(reopened.get(id).status, IntentStatus::Sent);
    }
}
