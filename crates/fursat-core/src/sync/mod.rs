//! Synchronization hooks
//!
//! One hook per live stream the client renders: the post feed, the
//! conversation list, an open chat, and the story rail. Each hook owns a
//! gateway subscription drained by a spawned listener task, a snapshot
//! guarded by a mutex, and a `changed` broadcast that tells consumers to
//! re-read the snapshot.
//!
//! Scope changes and teardown race in-flight fetches. Every snapshot
//! mutation is gated on an epoch counter: changing scope or tearing down
//! advances the epoch, and a fetch that started under an older epoch is
//! discarded when it resolves. The last requested scope always wins,
//! regardless of response arrival order.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::FursatResult;

mod chat;
mod conversations;
mod feed;
mod stories;

pub use chat::ChatStream;
pub use conversations::ConversationList;
pub use feed::PostFeed;
pub use stories::StoryRail;

const CHANGED_CHANNEL_CAPACITY: usize = 16;

/// Point-in-time view of a hook's stream.
///
/// `error` holds the display message of the most recent failed fetch; the
/// items are whatever the last successful fetch produced, so a refresh
/// failure never blanks an already-rendered list.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

struct State<T> {
    items: Vec<T>,
    loading: bool,
    error: Option<String>,
}

/// Epoch-gated snapshot cell shared between a hook and its listener task.
pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    epoch: AtomicU64,
    changed: broadcast::Sender<()>,
}

impl<T: Clone> Shared<T> {
    pub(crate) fn new() -> Self {
        let (changed, _) = broadcast::channel(CHANGED_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State {
                items: Vec::new(),
                loading: true,
                error: None,
            }),
            epoch: AtomicU64::new(0),
            changed,
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        let state = self.state.lock();
        Snapshot {
            items: state.items.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub(crate) fn subscribe_changed(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Open a new epoch for a (re)started scope and flag the snapshot as
    /// loading. Fetches carrying older epochs are discarded from here on.
    pub(crate) fn advance(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.lock().loading = true;
        self.notify();
        epoch
    }

    /// Invalidate all in-flight fetches without opening a new scope.
    pub(crate) fn retire(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Resolve a fetch started under `epoch`. Returns false (and changes
    /// nothing) when the epoch has moved on since the fetch began.
    pub(crate) fn apply(&self, epoch: u64, result: FursatResult<Vec<T>>) -> bool {
        if self.epoch() != epoch {
            tracing::debug!(epoch, "discarding fetch result from a superseded scope");
            return false;
        }
        {
            let mut state = self.state.lock();
            match result {
                Ok(items) => {
                    state.items = items;
                    state.error = None;
                }
                Err(err) => state.error = Some(err.to_string()),
            }
            state.loading = false;
        }
        self.notify();
        true
    }

    /// Mutate the items in place (incremental merge), epoch-gated like
    /// [`Shared::apply`].
    pub(crate) fn mutate(&self, epoch: u64, f: impl FnOnce(&mut Vec<T>)) -> bool {
        if self.epoch() != epoch {
            return false;
        }
        {
            let mut state = self.state.lock();
            f(&mut state.items);
            state.loading = false;
        }
        self.notify();
        true
    }

    fn notify(&self) {
        // No receivers is fine; consumers poll the snapshot when they attach.
        let _ = self.changed.send(());
    }
}
