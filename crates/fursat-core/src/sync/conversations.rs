//! Live conversation list (inbox).
//!
//! Watches message inserts rather than conversation rows: every visible
//! inbox change (new last message, re-ordering) is caused by a message
//! arriving somewhere, and the assembled view depends on cross-table joins,
//! so each insert triggers a full conversation re-fetch. A conversation
//! created without a message becomes visible on the next refresh or when
//! its first message lands.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::gateway::{tables, ChangeKind, Gateway};
use crate::resources::Messages;
use crate::sync::{Shared, Snapshot};
use crate::types::Conversation;

/// Hook keeping the viewer's inbox current.
pub struct ConversationList {
    inner: Arc<ListInner>,
}

struct ListInner {
    gateway: Arc<dyn Gateway>,
    messages: Messages,
    shared: Shared<Conversation>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationList {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                messages: Messages::new(gateway.clone()),
                gateway,
                shared: Shared::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to message inserts and run the initial fetch.
    pub async fn start(&self) {
        let epoch = self.inner.shared.advance();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        match self.inner.gateway.subscribe(tables::MESSAGES, None) {
            Ok(mut events) => {
                let inner = self.inner.clone();
                let task = tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        if event.kind != ChangeKind::Insert {
                            continue;
                        }
                        let epoch = inner.shared.epoch();
                        let result = inner.messages.list_conversations().await;
                        inner.shared.apply(epoch, result);
                    }
                });
                *self.inner.task.lock() = Some(task);
            }
            Err(err) => {
                warn!(%err, "conversation list subscription failed; list will not live-update")
            }
        }

        let result = self.inner.messages.list_conversations().await;
        self.inner.shared.apply(epoch, result);
    }

    pub fn snapshot(&self) -> Snapshot<Conversation> {
        self.inner.shared.snapshot()
    }

    pub fn changed(&self) -> broadcast::Receiver<()> {
        self.inner.shared.subscribe_changed()
    }

    pub async fn refresh(&self) {
        let epoch = self.inner.shared.epoch();
        let result = self.inner.messages.list_conversations().await;
        self.inner.shared.apply(epoch, result);
    }

    /// Stop listening. Safe to call more than once.
    pub fn teardown(&self) {
        self.inner.shared.retire();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for ConversationList {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test]
    async fn test_inbox_updates_on_new_message() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let messages = Messages::new(gateway.clone());

        let list = ConversationList::new(gateway.clone());
        list.start().await;
        assert!(list.snapshot().items.is_empty());

        let mut changed = list.changed();
        let conversation = messages.ensure_conversation("lin").await.unwrap();
        messages.send_message(&conversation, "hey").await.unwrap();

        for _ in 0..16 {
            if !list.snapshot().items.is_empty() {
                break;
            }
            let _ =
                tokio::time::timeout(std::time::Duration::from_millis(200), changed.recv()).await;
        }

        let snapshot = list.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(
            snapshot.items[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("hey")
        );
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_sets_error() {
        // No signed-in user: the inbox fetch fails but the hook stays usable.
        let gateway = Arc::new(MemoryGateway::new());
        let list = ConversationList::new(gateway);
        list.start().await;

        let snapshot = list.snapshot();
        assert!(snapshot.items.is_empty());
        assert!(snapshot.error.is_some());
        assert!(!snapshot.loading);
    }
}
