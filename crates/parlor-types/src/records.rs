use serde::{Deserialize, Serialize};

use crate::models::{Author, Message, MessageBody, Timestamp};

/// Raw record as stored in a channel log.
///
/// Every field is optional on the wire; [`MessageRecord::into_message`]
/// is the single place where a record is checked before it reaches a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<RecordUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecordError {
    #[error("record is not a message object: {0}")]
    Shape(String),

    #[error("record is missing `{0}`")]
    MissingField(&'static str),

    #[error("record has both content and image")]
    AmbiguousBody,

    #[error("record has neither content nor image")]
    EmptyBody,
}

impl MessageRecord {
    /// Build the wire form of a message, as the composition side would append it.
    pub fn from_message(message: &Message) -> Self {
        Self {
            timestamp: Some(message.timestamp.0),
            user: Some(RecordUser {
                id: Some(message.author.id.clone()),
                name: Some(message.author.name.clone()),
                avatar: Some(message.author.avatar_url.clone()),
            }),
            content: message.content().map(str::to_owned),
            image: message.media_url().map(str::to_owned),
        }
    }

    /// JSON form as stored in a log. Absent fields are omitted.
    pub fn to_value(&self) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        if let Some(timestamp) = self.timestamp {
            record.insert("timestamp".into(), timestamp.into());
        }
        if let Some(user) = &self.user {
            let mut fields = serde_json::Map::new();
            for (key, value) in [("id", &user.id), ("name", &user.name), ("avatar", &user.avatar)] {
                if let Some(value) = value {
                    fields.insert(key.into(), value.clone().into());
                }
            }
            record.insert("user".into(), fields.into());
        }
        if let Some(content) = &self.content {
            record.insert("content".into(), content.clone().into());
        }
        if let Some(image) = &self.image {
            record.insert("image".into(), image.clone().into());
        }
        record.into()
    }

    /// Parse a raw JSON record straight into a validated message.
    pub fn decode(value: serde_json::Value) -> Result<Message, MalformedRecordError> {
        let record: MessageRecord = serde_json::from_value(value)
            .map_err(|e| MalformedRecordError::Shape(e.to_string()))?;
        record.into_message()
    }

    pub fn into_message(self) -> Result<Message, MalformedRecordError> {
        let timestamp = self
            .timestamp
            .ok_or(MalformedRecordError::MissingField("timestamp"))?;
        let user = self.user.ok_or(MalformedRecordError::MissingField("user"))?;
        let id = non_empty(user.id).ok_or(MalformedRecordError::MissingField("user.id"))?;
        let name = non_empty(user.name).ok_or(MalformedRecordError::MissingField("user.name"))?;

        let body = match (non_empty(self.content), non_empty(self.image)) {
            (Some(text), None) => MessageBody::Text(text),
            (None, Some(url)) => MessageBody::Media(url),
            (Some(_), Some(_)) => return Err(MalformedRecordError::AmbiguousBody),
            (None, None) => return Err(MalformedRecordError::EmptyBody),
        };

        Ok(Message {
            author: Author {
                id,
                name,
                avatar_url: user.avatar.unwrap_or_default(),
            },
            body,
            timestamp: Timestamp(timestamp),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
