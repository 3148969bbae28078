pub mod events;
pub mod models;
pub mod records;

pub use events::Delivery;
pub use models::{
    Author, ChannelContext, ChannelId, LogKind, Message, MessageBody, Timestamp, UserIdentity,
};
pub use records::{MalformedRecordError, MessageRecord, RecordUser};
