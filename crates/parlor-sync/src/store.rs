use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parlor_types::{
    ChannelContext, Delivery, MalformedRecordError, Message, MessageRecord, Timestamp,
};

use crate::error::SubscriptionError;
use crate::list::{ListGuard, SharedList};
use crate::participants::ParticipantIndex;
use crate::subscription::{EventSource, EventSubscription, Generation, Tagged};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Idle,
    /// Subscribed, waiting for the first record or the end of replay.
    Loading,
    Live,
}

/// Outcome of applying one delivery.
#[derive(Debug)]
pub enum StoreUpdate {
    Appended(Arc<Message>),
    /// Replay finished before any record arrived; the channel is empty.
    CaughtUp,
    /// Nothing observable changed.
    Unchanged,
    /// Already materialized (at-least-once redelivery).
    Duplicate(Timestamp),
    /// From a superseded subscription; discarded.
    Stale(Generation),
    Malformed(MalformedRecordError),
    /// The log cut the subscription off. State has been cleared.
    Failed(SubscriptionError),
}

/// Materialized message list for the one active channel.
///
/// Sole writer of the list: readers only get shared snapshots. Every
/// [`activate`](Self::activate) starts a new [`Generation`]; deliveries tagged
/// with any other generation are never applied.
pub struct MessageStore {
    state: StoreState,
    generation: Generation,
    channel: Option<ChannelContext>,
    messages: SharedList,
    seen: HashSet<Timestamp>,
    participants: ParticipantIndex,
    subscription: Option<EventSubscription>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self {
            state: StoreState::Idle,
            generation: Generation::default(),
            channel: None,
            messages: SharedList::new(),
            seen: HashSet::new(),
            participants: ParticipantIndex::new(),
            subscription: None,
        }
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `channel`: drop everything from the previous channel, then
    /// subscribe. On failure the store is left empty and idle.
    pub fn activate<S: EventSource + ?Sized>(
        &mut self,
        source: &S,
        channel: ChannelContext,
        queue: mpsc::Sender<Tagged>,
    ) -> Result<Generation, SubscriptionError> {
        self.reset();
        self.state = StoreState::Loading;
        self.channel = Some(channel.clone());

        match EventSubscription::open(source, &channel, self.generation, queue) {
            Ok(subscription) => {
                info!(channel = %channel, generation = %self.generation, "channel activated");
                self.subscription = Some(subscription);
                Ok(self.generation)
            }
            Err(e) => {
                warn!(channel = %channel, "channel activation failed: {}", e);
                self.state = StoreState::Idle;
                Err(e)
            }
        }
    }

    /// Unsubscribe and discard all state.
    pub fn deactivate(&mut self) {
        if let Some(channel) = &self.channel {
            info!(channel = %channel, "channel deactivated");
        }
        self.reset();
        self.channel = None;
    }

    pub fn apply(&mut self, tagged: Tagged) -> StoreUpdate {
        if tagged.generation != self.generation || self.state == StoreState::Idle {
            debug!(
                stale = %tagged.generation,
                current = %self.generation,
                "discarding delivery from superseded subscription"
            );
            return StoreUpdate::Stale(tagged.generation);
        }

        match tagged.delivery {
            Delivery::Record(value) => self.append(value),
            Delivery::ReplayComplete => {
                if self.state == StoreState::Loading {
                    self.state = StoreState::Live;
                    StoreUpdate::CaughtUp
                } else {
                    StoreUpdate::Unchanged
                }
            }
            Delivery::Revoked { reason } => {
                // keep the channel so the failure can be attributed
                self.reset();
                let err = match &self.channel {
                    Some(channel) => SubscriptionError::revoked(channel, reason),
                    None => SubscriptionError::Unavailable(reason),
                };
                warn!("{}", err);
                StoreUpdate::Failed(err)
            }
        }
    }

    fn append(&mut self, value: serde_json::Value) -> StoreUpdate {
        let message = match MessageRecord::decode(value) {
            Ok(message) => message,
            Err(e) => {
                warn!(generation = %self.generation, "dropping malformed record: {}", e);
                return StoreUpdate::Malformed(e);
            }
        };

        if !self.seen.insert(message.timestamp) {
            debug!(timestamp = %message.timestamp, "duplicate record ignored");
            return StoreUpdate::Duplicate(message.timestamp);
        }

        let message = Arc::new(message);
        self.participants.observe(&message);
        self.messages.push(message.clone());
        self.state = StoreState::Live;
        StoreUpdate::Appended(message)
    }

    /// Close the subscription, clear derived state and start a new generation.
    fn reset(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.generation = self.generation.next();
        self.state = StoreState::Idle;
        self.messages.clear();
        self.seen.clear();
        self.participants.reset();
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn channel(&self) -> Option<&ChannelContext> {
        self.channel.as_ref()
    }

    pub fn messages(&self) -> ListGuard<'_> {
        self.messages.read()
    }

    pub fn live(&self) -> &SharedList {
        &self.messages
    }

    pub fn participants(&self) -> &ParticipantIndex {
        &self.participants
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(EventSubscription::is_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_log::MemoryLog;
    use parlor_types::{MessageBody, UserIdentity};
    use serde_json::json;

    fn user(name: &str) -> UserIdentity {
        UserIdentity {
            id: format!("id-{}", name),
            display_name: name.into(),
            avatar_url: String::new(),
        }
    }

    fn say(log: &MemoryLog, channel: &ChannelContext, author: &str, text: &str) -> Message {
        log.append(channel, &user(author), MessageBody::Text(text.into()))
    }

    /// Apply queued deliveries until `n` of them were handled.
    async fn pump(store: &mut MessageStore, rx: &mut mpsc::Receiver<Tagged>, n: usize) -> Vec<StoreUpdate> {
        let mut updates = Vec::new();
        for _ in 0..n {
            let tagged = rx.recv().await.unwrap();
            updates.push(store.apply(tagged));
        }
        updates
    }

    #[tokio::test]
    async fn test_materializes_in_delivery_order() {
        let log = MemoryLog::new();
        let channel = ChannelContext::public("general");
        let sent: Vec<Message> = (0..5)
            .map(|i| say(&log, &channel, "alice", &format!("m{}", i)))
            .collect();

        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        store.activate(&log, channel.clone(), tx).unwrap();
        assert_eq!(store.state(), StoreState::Loading);

        pump(&mut store, &mut rx, 6).await;
        assert_eq!(store.state(), StoreState::Live);

        let live = say(&log, &channel, "bob", "later");
        pump(&mut store, &mut rx, 1).await;

        let messages = store.messages();
        let got: Vec<&Message> = messages.iter().map(|m| m.as_ref()).collect();
        let want: Vec<&Message> = sent.iter().chain(std::iter::once(&live)).collect();
        assert_eq!(got, want);
        assert!(got.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(store.participants().count(), 2);
    }

    #[tokio::test]
    async fn test_empty_channel_goes_live_on_replay_complete() {
        let log = MemoryLog::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        store.activate(&log, ChannelContext::public("quiet"), tx).unwrap();

        let updates = pump(&mut store, &mut rx, 1).await;
        assert!(matches!(updates[0], StoreUpdate::CaughtUp));
        assert_eq!(store.state(), StoreState::Live);
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_switch_discards_previous_channel() {
        let log = MemoryLog::new();
        let x = ChannelContext::public("x");
        let y = ChannelContext::public("y");
        say(&log, &x, "alice", "in x");
        say(&log, &y, "bob", "in y");

        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        let gen_x = store.activate(&log, x.clone(), tx.clone()).unwrap();
        pump(&mut store, &mut rx, 2).await;
        assert_eq!(store.messages().len(), 1);

        let gen_y = store.activate(&log, y.clone(), tx).unwrap();
        assert!(gen_y > gen_x);
        assert!(store.messages().is_empty());
        assert_eq!(store.participants().count(), 0);
        assert_eq!(store.channel(), Some(&y));

        // a late event from x's subscription must not land in y
        let late = MessageRecord::from_message(&say(&log, &x, "carol", "late")).to_value();
        let update = store.apply(Tagged {
            generation: gen_x,
            delivery: Delivery::Record(late),
        });
        assert!(matches!(update, StoreUpdate::Stale(g) if g == gen_x));
        assert!(store.messages().is_empty());

        pump(&mut store, &mut rx, 2).await;
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].author.name, "bob");
        assert!(!store.participants().contains("alice"));
    }

    #[tokio::test]
    async fn test_malformed_record_is_dropped() {
        let log = MemoryLog::new();
        let channel = ChannelContext::public("general");
        log.append_raw(&channel, json!({ "timestamp": 1, "content": "no author" }));
        say(&log, &channel, "alice", "fine");

        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        store.activate(&log, channel, tx).unwrap();

        let updates = pump(&mut store, &mut rx, 3).await;
        assert!(matches!(
            updates[0],
            StoreUpdate::Malformed(MalformedRecordError::MissingField("user"))
        ));
        assert!(matches!(updates[1], StoreUpdate::Appended(_)));
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_ignored() {
        let log = MemoryLog::new();
        let channel = ChannelContext::public("general");
        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        let generation = store.activate(&log, channel.clone(), tx).unwrap();
        pump(&mut store, &mut rx, 1).await;

        let record = MessageRecord::from_message(&say(&log, &channel, "alice", "once")).to_value();
        pump(&mut store, &mut rx, 1).await;
        let update = store.apply(Tagged {
            generation,
            delivery: Delivery::Record(record),
        });
        assert!(matches!(update, StoreUpdate::Duplicate(_)));
        assert_eq!(store.messages().len(), 1);
        // the redelivery never reached the participant index
        assert_eq!(store.participants().probes(), 2);
    }

    #[tokio::test]
    async fn test_participant_work_is_per_message() {
        let log = MemoryLog::new();
        let channel = ChannelContext::public("busy");
        for i in 0..50 {
            say(&log, &channel, ["ann", "ben", "cat"][i % 3], "hi");
        }

        let (tx, mut rx) = mpsc::channel(64);
        let mut store = MessageStore::new();
        store.activate(&log, channel, tx).unwrap();
        pump(&mut store, &mut rx, 51).await;

        assert_eq!(store.messages().len(), 50);
        assert_eq!(store.participants().count(), 3);
        assert_eq!(store.participants().probes(), 50 + 3);
    }

    #[tokio::test]
    async fn test_denied_activation_leaves_store_empty() {
        let log = MemoryLog::new();
        let channel = ChannelContext::private("dm");
        log.deny(&channel);

        let (tx, _rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        let err = store.activate(&log, channel, tx).unwrap_err();
        assert!(matches!(err, SubscriptionError::Denied { .. }));
        assert_eq!(store.state(), StoreState::Idle);
        assert!(store.messages().is_empty());
        assert!(!store.is_subscribed());
    }

    #[tokio::test]
    async fn test_revocation_clears_state() {
        let log = MemoryLog::new();
        let channel = ChannelContext::public("general");
        say(&log, &channel, "alice", "hi");

        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        store.activate(&log, channel.clone(), tx).unwrap();
        pump(&mut store, &mut rx, 2).await;

        log.revoke(&channel, "banned");
        let updates = pump(&mut store, &mut rx, 1).await;
        assert!(matches!(updates[0], StoreUpdate::Failed(SubscriptionError::Revoked { .. })));
        assert_eq!(store.state(), StoreState::Idle);
        assert!(store.messages().is_empty());
        assert_eq!(store.channel(), Some(&channel));
    }

    #[tokio::test]
    async fn test_deactivate() {
        let log = MemoryLog::new();
        let channel = ChannelContext::public("general");
        let (tx, mut rx) = mpsc::channel(16);
        let mut store = MessageStore::new();
        let generation = store.activate(&log, channel.clone(), tx).unwrap();
        pump(&mut store, &mut rx, 1).await;

        store.deactivate();
        assert_eq!(store.state(), StoreState::Idle);
        assert_eq!(store.channel(), None);
        assert!(!store.is_subscribed());

        let record = MessageRecord::from_message(&say(&log, &channel, "alice", "after")).to_value();
        let update = store.apply(Tagged {
            generation,
            delivery: Delivery::Record(record),
        });
        assert!(matches!(update, StoreUpdate::Stale(_)));
    }
}
