/// Parlor sync: keeps a client's view of one chat channel in step with its
/// append-only message log.
///
/// Pipeline, one direction only:
/// - `subscription`: cancellable, generation-tagged feed from an `EventSource`
/// - `store`: materialized message list for the active channel, kept in a
///   `list::SharedList` so snapshots can share it
/// - `participants`: incremental distinct-author count
/// - `search`: debounced client-side filtering over the materialized list
/// - `view`: picks the live list or the search matches for rendering
///
/// `session` runs all of it on a single task and publishes `ViewSnapshot`s.

pub mod config;
pub mod error;
pub mod list;
pub mod memory_log;
pub mod participants;
pub mod search;
pub mod session;
pub mod store;
pub mod subscription;
pub mod view;

pub use config::SyncConfig;
pub use error::{ConfigError, SessionClosed, SubscriptionError, SyncError};
pub use list::{ListGuard, ListSnapshot, SharedList};
pub use memory_log::MemoryLog;
pub use participants::{ParticipantIndex, participant_label};
pub use search::{QueryGeneration, QuerySuperseded, SearchIndexer, SearchStatus};
pub use session::{SyncHandle, ViewSnapshot, spawn_session};
pub use store::{MessageStore, StoreState, StoreUpdate};
pub use subscription::{EventSource, EventSubscription, Generation, LogFeed, Tagged};
pub use view::select_view;
