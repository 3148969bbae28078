use parlor_types::{ChannelContext, MalformedRecordError};

/// Opening (or keeping) a channel subscription failed.
///
/// Never retried here; the caller decides whether to activate again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("access to {channel} denied")]
    Denied { channel: String },

    #[error("subscription to {channel} revoked: {reason}")]
    Revoked { channel: String, reason: String },

    #[error("message log unavailable: {0}")]
    Unavailable(String),
}

impl SubscriptionError {
    pub fn denied(channel: &ChannelContext) -> Self {
        Self::Denied {
            channel: channel.to_string(),
        }
    }

    pub fn revoked(channel: &ChannelContext, reason: impl Into<String>) -> Self {
        Self::Revoked {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }
}

/// Diagnostics surfaced to whoever watches a sync session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("dropped malformed record on {channel}: {source}")]
    MalformedRecord {
        channel: String,
        #[source]
        source: MalformedRecordError,
    },
}

/// The session task is gone; commands can no longer be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sync session has shut down")]
pub struct SessionClosed;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
