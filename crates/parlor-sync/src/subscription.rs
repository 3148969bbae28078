use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use parlor_types::{ChannelContext, Delivery};

use crate::error::SubscriptionError;

/// An open feed from a message log: existing records first, then live appends.
///
/// Dropping the receiver detaches the feed from its log.
pub struct LogFeed {
    pub id: Uuid,
    pub deliveries: mpsc::Receiver<Delivery>,
}

/// A remote (or in-process) store of per-channel append-only logs.
///
/// Implementations are passed explicitly to each session; there is no global
/// store handle.
pub trait EventSource: Send + Sync + 'static {
    /// Attach to the log for `channel`. The log is chosen from
    /// `channel.is_private` alone.
    fn open(&self, channel: &ChannelContext) -> Result<LogFeed, SubscriptionError>;
}

impl<S: EventSource + ?Sized> EventSource for Arc<S> {
    fn open(&self, channel: &ChannelContext) -> Result<LogFeed, SubscriptionError> {
        (**self).open(channel)
    }
}

/// Tag that separates one subscription from the ones it superseded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A delivery as it lands in the session queue.
#[derive(Debug, Clone)]
pub struct Tagged {
    pub generation: Generation,
    pub delivery: Delivery,
}

/// Live attachment of one channel log to a session queue.
///
/// A forwarder task moves deliveries from the feed into the queue, tagging
/// each with this subscription's generation. [`close`](Self::close) aborts the
/// forwarder, which drops the feed and detaches it from the log.
pub struct EventSubscription {
    channel: ChannelContext,
    generation: Generation,
    feed_id: Uuid,
    forwarder: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Must be called from within a tokio runtime.
    pub fn open<S: EventSource + ?Sized>(
        source: &S,
        channel: &ChannelContext,
        generation: Generation,
        queue: mpsc::Sender<Tagged>,
    ) -> Result<Self, SubscriptionError> {
        let LogFeed {
            id: feed_id,
            mut deliveries,
        } = source.open(channel)?;

        info!(channel = %channel, %generation, feed = %feed_id, "subscription opened");

        let forwarder = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                let terminal = delivery.is_terminal();
                if queue.send(Tagged { generation, delivery }).await.is_err() {
                    break;
                }
                if terminal {
                    break;
                }
            }
            debug!(%generation, feed = %feed_id, "feed drained");
        });

        Ok(Self {
            channel: channel.clone(),
            generation,
            feed_id,
            forwarder: Some(forwarder),
        })
    }

    pub fn channel(&self) -> &ChannelContext {
        &self.channel
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.forwarder.is_some()
    }

    /// Stop delivery. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            info!(
                channel = %self.channel,
                generation = %self.generation,
                feed = %self.feed_id,
                "subscription closed"
            );
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
