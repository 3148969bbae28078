use serde::{Deserialize, Serialize};

/// What a channel log pushes to one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Delivery {
    /// One appended record, undecoded.
    Record(serde_json::Value),

    /// Every record that existed at subscribe time has been delivered.
    /// Sent even when the log is empty.
    ReplayComplete,

    /// The log stopped serving this subscriber (e.g. access was revoked).
    /// No further deliveries follow.
    Revoked { reason: String },
}

impl Delivery {
    /// True for deliveries after which nothing else will arrive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }
}
