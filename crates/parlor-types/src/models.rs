use std::fmt;

use serde::{Deserialize, Serialize};

// -- Timestamps --

/// Server-assigned, per-channel unique ordering key (milliseconds).
///
/// Doubles as the identity of a message: there is no separate message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Messages --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

/// Exactly one of text content or an uploaded media URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum MessageBody {
    Text(String),
    Media(String),
}

/// A validated, immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub author: Author,
    pub body: MessageBody,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn content(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Media(_) => None,
        }
    }

    pub fn media_url(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Media(url) => Some(url),
            MessageBody::Text(_) => None,
        }
    }

    /// Whether the signed-in user wrote this message.
    pub fn is_from(&self, user: &UserIdentity) -> bool {
        self.author.id == user.id
    }
}

// -- Identity --

/// The signed-in user, as handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl UserIdentity {
    pub fn as_author(&self) -> Author {
        Author {
            id: self.id.clone(),
            name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

// -- Channels --

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of the two append-only logs a channel lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Public,
    Private,
}

impl LogKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => "messages",
            Self::Private => "privateMessages",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelContext {
    pub channel_id: ChannelId,
    pub is_private: bool,
}

impl ChannelContext {
    pub fn public(id: impl Into<String>) -> Self {
        Self {
            channel_id: ChannelId::new(id),
            is_private: false,
        }
    }

    pub fn private(id: impl Into<String>) -> Self {
        Self {
            channel_id: ChannelId::new(id),
            is_private: true,
        }
    }

    /// The log to subscribe to is decided by the privacy flag alone.
    pub fn log(&self) -> LogKind {
        if self.is_private {
            LogKind::Private
        } else {
            LogKind::Public
        }
    }

    /// `#general` for public channels, `@alice` for direct conversations.
    pub fn display_name(&self, name: &str) -> String {
        let sigil = if self.is_private { '@' } else { '#' };
        format!("{}{}", sigil, name)
    }
}

impl fmt::Display for ChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.log().name(), self.channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(body: MessageBody) -> Message {
        Message {
            author: Author {
                id: "u1".into(),
                name: "alice".into(),
                avatar_url: "https://avatars.example/alice.png".into(),
            },
            body,
            timestamp: Timestamp(1),
        }
    }

    #[test]
    fn test_log_follows_privacy_flag() {
        assert_eq!(ChannelContext::public("general").log(), LogKind::Public);
        assert_eq!(ChannelContext::private("general").log(), LogKind::Private);
    }

    #[test]
    fn test_display_name_sigil() {
        assert_eq!(ChannelContext::public("c1").display_name("general"), "#general");
        assert_eq!(ChannelContext::private("c2").display_name("bob"), "@bob");
    }

    #[test]
    fn test_body_accessors() {
        let text = sample(MessageBody::Text("hi".into()));
        assert_eq!(text.content(), Some("hi"));
        assert_eq!(text.media_url(), None);

        let media = sample(MessageBody::Media("https://cdn.example/a.png".into()));
        assert_eq!(media.content(), None);
        assert_eq!(media.media_url(), Some("https://cdn.example/a.png"));
    }

    #[test]
    fn test_is_from() {
        let msg = sample(MessageBody::Text("hi".into()));
        let me = UserIdentity {
            id: "u1".into(),
            display_name: "alice".into(),
            avatar_url: String::new(),
        };
        let other = UserIdentity { id: "u2".into(), ..me.clone() };
        assert!(msg.is_from(&me));
        assert!(!msg.is_from(&other));
    }
}
