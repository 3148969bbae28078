use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parlor_types::{
    ChannelContext, ChannelId, Delivery, LogKind, Message, MessageBody, MessageRecord, Timestamp,
    UserIdentity,
};

use crate::error::SubscriptionError;
use crate::subscription::{EventSource, LogFeed};

/// Per-feed buffer between a channel log and one subscriber.
const FEED_CAPACITY: usize = 64;

type LogKey = (LogKind, ChannelId);

fn key(channel: &ChannelContext) -> LogKey {
    (channel.log(), channel.channel_id.clone())
}

/// In-process pair of append-only logs ("messages" and "privateMessages"),
/// keyed by channel id.
///
/// Subscribers get every record already in the log, then a
/// [`Delivery::ReplayComplete`] marker, then each later append. Records are
/// never changed or removed once appended.
#[derive(Clone, Default)]
pub struct MemoryLog {
    inner: Arc<MemoryLogInner>,
}

#[derive(Default)]
struct MemoryLogInner {
    /// (log, channel) -> records
    logs: RwLock<HashMap<LogKey, Arc<ChannelLog>>>,

    /// Channels whose subscriptions are refused
    denied: RwLock<HashSet<LogKey>>,

    /// Last timestamp handed out by `append`, shared by every channel
    last_timestamp: Mutex<i64>,
}

struct ChannelLog {
    records: RwLock<Vec<serde_json::Value>>,
    revoked: RwLock<Option<String>>,
    /// Bumped on every append or revocation to wake feeds
    version: watch::Sender<u64>,
}

impl ChannelLog {
    fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            records: RwLock::new(Vec::new()),
            revoked: RwLock::new(None),
            version,
        }
    }

    fn push(&self, record: serde_json::Value) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        self.version.send_modify(|v| *v += 1);
    }

    fn set_revoked(&self, reason: Option<String>) {
        *self.revoked.write().unwrap_or_else(PoisonError::into_inner) = reason;
        self.version.send_modify(|v| *v += 1);
    }

    /// Records from `from` onwards, plus the revocation reason if any.
    fn read_from(&self, from: usize) -> (Vec<serde_json::Value>, Option<String>) {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let batch = records.get(from..).map(|tail| tail.to_vec()).unwrap_or_default();
        let revoked = self
            .revoked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        (batch, revoked)
    }

    fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message authored by `author`, assigning the next timestamp.
    pub fn append(&self, channel: &ChannelContext, author: &UserIdentity, body: MessageBody) -> Message {
        let message = Message {
            author: author.as_author(),
            body,
            timestamp: self.next_timestamp(),
        };
        self.append_raw(channel, MessageRecord::from_message(&message).to_value());
        message
    }

    /// Append a record exactly as given, without validation.
    pub fn append_raw(&self, channel: &ChannelContext, record: serde_json::Value) {
        self.channel_log(&key(channel)).push(record);
        debug!(channel = %channel, "record appended");
    }

    /// Number of records in a channel's log.
    pub fn len(&self, channel: &ChannelContext) -> usize {
        self.inner
            .logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(channel))
            .map_or(0, |log| log.len())
    }

    /// Refuse future subscriptions to `channel`.
    pub fn deny(&self, channel: &ChannelContext) {
        self.inner
            .denied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(channel));
    }

    /// Undo [`deny`](Self::deny) and [`revoke`](Self::revoke).
    pub fn allow(&self, channel: &ChannelContext) {
        let key = key(channel);
        self.inner
            .denied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        if let Some(log) = self.existing_log(&key) {
            log.set_revoked(None);
        }
    }

    /// Cut off every current subscriber of `channel` and deny new ones.
    pub fn revoke(&self, channel: &ChannelContext, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(channel = %channel, %reason, "revoking channel access");
        self.deny(channel);
        self.channel_log(&key(channel)).set_revoked(Some(reason));
    }

    fn next_timestamp(&self) -> Timestamp {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self
            .inner
            .last_timestamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = now.max(*last + 1);
        Timestamp(*last)
    }

    fn existing_log(&self, key: &LogKey) -> Option<Arc<ChannelLog>> {
        self.inner
            .logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn channel_log(&self, key: &LogKey) -> Arc<ChannelLog> {
        if let Some(log) = self.existing_log(key) {
            return log;
        }
        self.inner
            .logs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ChannelLog::new()))
            .clone()
    }
}

impl EventSource for MemoryLog {
    fn open(&self, channel: &ChannelContext) -> Result<LogFeed, SubscriptionError> {
        let key = key(channel);
        let denied = self
            .inner
            .denied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key);
        if denied {
            warn!(channel = %channel, "subscription refused");
            return Err(SubscriptionError::denied(channel));
        }

        let log = self.channel_log(&key);
        let changes = log.version.subscribe();
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let id = Uuid::new_v4();

        info!(channel = %channel, feed = %id, "feed attached");
        tokio::spawn(run_feed(log, changes, tx, id));

        Ok(LogFeed {
            id,
            deliveries: rx,
        })
    }
}

async fn run_feed(
    log: Arc<ChannelLog>,
    mut changes: watch::Receiver<u64>,
    tx: mpsc::Sender<Delivery>,
    id: Uuid,
) {
    let mut next = 0;
    let mut replayed = false;

    loop {
        // Mark the current version seen before reading, so an append racing
        // with the read still wakes the wait below.
        let _ = changes.borrow_and_update();
        let (batch, revoked) = log.read_from(next);

        for record in batch {
            if tx.send(Delivery::Record(record)).await.is_err() {
                debug!(feed = %id, "feed detached");
                return;
            }
            next += 1;
        }

        if !replayed {
            if tx.send(Delivery::ReplayComplete).await.is_err() {
                return;
            }
            replayed = true;
        }

        if let Some(reason) = revoked {
            let _ = tx.send(Delivery::Revoked { reason }).await;
            return;
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = tx.closed() => {
                debug!(feed = %id, "feed detached");
                return;
            }
        }
    }
}
