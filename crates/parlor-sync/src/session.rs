use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parlor_types::ChannelContext;

use crate::config::SyncConfig;
use crate::error::{SessionClosed, SyncError};
use crate::list::ListSnapshot;
use crate::participants::participant_label;
use crate::search::{QueryGeneration, SearchIndexer, SearchStatus};
use crate::store::{MessageStore, StoreState, StoreUpdate};
use crate::subscription::{EventSource, Tagged};
use crate::view::select_view;

/// Everything the presentation layer needs to render one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub channel: Option<ChannelContext>,
    pub state: StoreState,
    /// Search matches while a search is active, the live list otherwise.
    /// Shares storage with the session; taking a snapshot copies nothing.
    pub messages: ListSnapshot,
    /// Size of the live list, whatever is being shown.
    pub live_count: usize,
    pub participant_count: usize,
    pub query: Option<String>,
    pub search_status: SearchStatus,
}

impl Default for ViewSnapshot {
    fn default() -> Self {
        Self {
            channel: None,
            state: StoreState::Idle,
            messages: ListSnapshot::default(),
            live_count: 0,
            participant_count: 0,
            query: None,
            search_status: SearchStatus::Inactive,
        }
    }
}

impl ViewSnapshot {
    pub fn participant_label(&self) -> String {
        participant_label(self.participant_count)
    }

    pub fn is_loading(&self) -> bool {
        self.state == StoreState::Loading
    }

    pub fn is_searching(&self) -> bool {
        self.search_status != SearchStatus::Inactive
    }
}

/// Most deliveries applied before publishing a snapshot.
const DELIVERY_BATCH: usize = 256;

#[derive(Debug)]
enum Command {
    Activate(ChannelContext),
    Deactivate,
    SetQuery(String),
    Shutdown,
}

/// Cloneable front end of a running sync session.
///
/// The session stops when [`shutdown`](Self::shutdown) is called or the last
/// handle is dropped; its subscription is closed either way.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<ViewSnapshot>,
    diagnostics: broadcast::Sender<SyncError>,
}

impl SyncHandle {
    /// Make `channel` the active channel, discarding the current one.
    pub fn activate(&self, channel: ChannelContext) -> Result<(), SessionClosed> {
        self.send(Command::Activate(channel))
    }

    /// Leave the active channel (e.g. the view was unmounted).
    pub fn deactivate(&self) -> Result<(), SessionClosed> {
        self.send(Command::Deactivate)
    }

    /// Replace the search query. An empty query ends the search.
    pub fn set_query(&self, text: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Command::SetQuery(text.into()))
    }

    pub fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(Command::Shutdown)
    }

    /// Receiver notified on every published snapshot.
    pub fn view(&self) -> watch::Receiver<ViewSnapshot> {
        self.view.clone()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.view.borrow().clone()
    }

    /// Errors reported from now on. Each is reported once.
    pub fn diagnostics(&self) -> broadcast::Receiver<SyncError> {
        self.diagnostics.subscribe()
    }

    fn send(&self, command: Command) -> Result<(), SessionClosed> {
        self.commands.send(command).map_err(|_| SessionClosed)
    }
}

/// Start a session over `source` on its own task.
///
/// All state changes happen on that one task: commands, deliveries and
/// search settles are queued and handled strictly one at a time.
pub fn spawn_session<S: EventSource>(source: S, config: SyncConfig) -> (SyncHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (deliveries_tx, deliveries_rx) = mpsc::channel(config.delivery_capacity);
    let (settle_tx, settle_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(ViewSnapshot::default());
    let (diagnostics_tx, _) = broadcast::channel(config.diagnostics_capacity);

    let session = SyncSession {
        source,
        settle_delay: config.settle_delay,
        store: MessageStore::new(),
        search: SearchIndexer::new(),
        pending_settle: None,
        deliveries: deliveries_tx,
        settles: settle_tx,
        view: view_tx,
        diagnostics: diagnostics_tx.clone(),
    };

    let task = tokio::spawn(session.run(commands_rx, deliveries_rx, settle_rx));

    let handle = SyncHandle {
        commands: commands_tx,
        view: view_rx,
        diagnostics: diagnostics_tx,
    };
    (handle, task)
}

struct SyncSession<S> {
    source: S,
    settle_delay: Duration,
    store: MessageStore,
    search: SearchIndexer,
    /// Timer for the current query's settle; aborted when superseded
    pending_settle: Option<JoinHandle<()>>,
    deliveries: mpsc::Sender<Tagged>,
    settles: mpsc::UnboundedSender<QueryGeneration>,
    view: watch::Sender<ViewSnapshot>,
    diagnostics: broadcast::Sender<SyncError>,
}

impl<S: EventSource> SyncSession<S> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut deliveries: mpsc::Receiver<Tagged>,
        mut settles: mpsc::UnboundedReceiver<QueryGeneration>,
    ) {
        info!("sync session started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(tagged) = deliveries.recv() => {
                    // apply what is already queued (e.g. a replay) before one publish
                    let mut changed = self.handle_delivery(tagged);
                    for _ in 1..DELIVERY_BATCH {
                        match deliveries.try_recv() {
                            Ok(tagged) => changed |= self.handle_delivery(tagged),
                            Err(_) => break,
                        }
                    }
                    if changed {
                        self.publish();
                    }
                }
                Some(generation) = settles.recv() => self.handle_settle(generation),
            }
        }

        self.cancel_settle();
        self.store.deactivate();
        info!("sync session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Activate(channel) => {
                self.cancel_settle();
                self.search.reset();
                if let Err(e) = self
                    .store
                    .activate(&self.source, channel, self.deliveries.clone())
                {
                    self.report(e.into());
                }
            }
            Command::Deactivate => {
                self.cancel_settle();
                self.search.reset();
                self.store.deactivate();
            }
            Command::SetQuery(text) => {
                self.cancel_settle();
                if let Some(generation) = self.search.set_query(&text) {
                    self.search.recompute(&self.store.messages());
                    debug!(query = %text, %generation, "search started");
                    self.schedule_settle(generation);
                }
            }
            Command::Shutdown => return,
        }
        self.publish();
    }

    /// Apply one delivery; returns whether the view needs republishing.
    fn handle_delivery(&mut self, tagged: Tagged) -> bool {
        match self.store.apply(tagged) {
            StoreUpdate::Appended(message) => {
                self.search.observe(&message);
                true
            }
            StoreUpdate::CaughtUp => true,
            StoreUpdate::Failed(e) => {
                self.cancel_settle();
                self.search.reset();
                self.report(e.into());
                true
            }
            StoreUpdate::Malformed(source) => {
                let channel = self
                    .store
                    .channel()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.report(SyncError::MalformedRecord { channel, source });
                false
            }
            StoreUpdate::Unchanged | StoreUpdate::Duplicate(_) | StoreUpdate::Stale(_) => false,
        }
    }

    fn handle_settle(&mut self, generation: QueryGeneration) {
        match self.search.settle(generation) {
            Ok(()) => {
                debug!(%generation, "search settled");
                self.pending_settle = None;
                self.publish();
            }
            Err(superseded) => debug!("{}", superseded),
        }
    }

    fn schedule_settle(&mut self, generation: QueryGeneration) {
        let settles = self.settles.clone();
        let delay = self.settle_delay;
        self.pending_settle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = settles.send(generation);
        }));
    }

    fn cancel_settle(&mut self) {
        if let Some(timer) = self.pending_settle.take() {
            timer.abort();
        }
    }

    fn report(&self, err: SyncError) {
        match &err {
            SyncError::Subscription(_) => error!("{}", err),
            SyncError::MalformedRecord { .. } => warn!("{}", err),
        }
        // no receivers just means nobody is watching
        let _ = self.diagnostics.send(err);
    }

    fn publish(&self) {
        let live = self.store.live();
        let selected = select_view(self.search.active_matches(), live);

        self.view.send_replace(ViewSnapshot {
            channel: self.store.channel().cloned(),
            state: self.store.state(),
            messages: selected.snapshot(),
            live_count: live.len(),
            participant_count: self.store.participants().count(),
            query: self.search.query().map(str::to_owned),
            search_status: self.search.status(),
        });
    }
}
