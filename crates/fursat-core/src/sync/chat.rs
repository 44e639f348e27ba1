//! Live message stream for one open conversation.
//!
//! Message rows are append-only and immutable, so unlike the other hooks
//! this one merges delivered rows incrementally instead of re-fetching:
//! each insert is de-duplicated by id and spliced in sorted by `created_at`.
//! Out-of-order delivery therefore still renders in timeline order, and a
//! sent message echoed back by the subscription is absorbed silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{FursatError, FursatResult};
use crate::gateway::{decode_row, tables, ChangeKind, Filter, Gateway};
use crate::resources::Messages;
use crate::sync::{Shared, Snapshot};
use crate::types::MessageRecord;

/// Splice a message into an id-deduplicated, `created_at`-ascending list.
pub(crate) fn merge_message(items: &mut Vec<MessageRecord>, message: MessageRecord) {
    if items.iter().any(|m| m.id == message.id) {
        return;
    }
    let at = items
        .iter()
        .position(|m| m.created_at > message.created_at)
        .unwrap_or(items.len());
    items.insert(at, message);
}

/// Hook keeping one conversation's message history current.
pub struct ChatStream {
    inner: Arc<ChatInner>,
}

struct ChatInner {
    gateway: Arc<dyn Gateway>,
    messages: Messages,
    conversation: Mutex<Option<String>>,
    shared: Shared<MessageRecord>,
    sending: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatStream {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            inner: Arc::new(ChatInner {
                messages: Messages::new(gateway.clone()),
                gateway,
                conversation: Mutex::new(None),
                shared: Shared::new(),
                sending: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Open a conversation: closes any previously open one, subscribes to
    /// its inserts, and fetches the history. Fetches still in flight for
    /// the previous conversation are discarded.
    pub async fn open(&self, conversation_id: &str) {
        *self.inner.conversation.lock() = Some(conversation_id.to_string());
        let epoch = self.inner.shared.advance();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        let filter = Filter::Eq("conversation_id", json!(conversation_id));
        match self.inner.gateway.subscribe(tables::MESSAGES, Some(filter)) {
            Ok(mut events) => {
                let inner = self.inner.clone();
                let task = tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        if event.kind != ChangeKind::Insert {
                            continue;
                        }
                        match decode_row::<MessageRecord>(event.row) {
                            Ok(message) => {
                                let epoch = inner.shared.epoch();
                                inner
                                    .shared
                                    .mutate(epoch, |items| merge_message(items, message));
                            }
                            Err(err) => warn!(%err, "undecodable message event; skipping"),
                        }
                    }
                });
                *self.inner.task.lock() = Some(task);
            }
            Err(err) => warn!(%err, "chat subscription failed; stream will not live-update"),
        }

        let result = self.inner.messages.list_messages(conversation_id).await;
        self.inner.shared.apply(epoch, result);
    }

    pub fn snapshot(&self) -> Snapshot<MessageRecord> {
        self.inner.shared.snapshot()
    }

    pub fn changed(&self) -> broadcast::Receiver<()> {
        self.inner.shared.subscribe_changed()
    }

    /// Whether a send is currently in flight.
    pub fn is_sending(&self) -> bool {
        self.inner.sending.load(Ordering::Acquire)
    }

    /// Send a message on the open conversation and merge it locally without
    /// waiting for the subscription echo. The sending flag clears on
    /// settlement either way.
    pub async fn send(&self, content: &str) -> FursatResult<MessageRecord> {
        let conversation_id = self
            .inner
            .conversation
            .lock()
            .clone()
            .ok_or_else(|| FursatError::Subscription("no open conversation".to_string()))?;

        self.inner.sending.store(true, Ordering::Release);
        let result = self.inner.messages.send_message(&conversation_id, content).await;
        self.inner.sending.store(false, Ordering::Release);

        let message = result?;
        let epoch = self.inner.shared.epoch();
        let merged = message.clone();
        self.inner
            .shared
            .mutate(epoch, |items| merge_message(items, merged));
        Ok(message)
    }

    /// Close the stream. Safe to call more than once.
    pub fn teardown(&self) {
        self.inner.shared.retire();
        *self.inner.conversation.lock() = None;
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(id: &str, offset_secs: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "ada".to_string(),
            content: id.to_string(),
            created_at: Utc::now() + Duration::seconds(offset_secs),
            is_read: false,
        }
    }

    #[test]
    fn test_merge_out_of_order_arrival() {
        let mut items = Vec::new();
        merge_message(&mut items, message("t2", 2));
        merge_message(&mut items, message("t1", 1));
        assert_eq!(items[0].id, "t1");
        assert_eq!(items[1].id, "t2");
    }

    #[test]
    fn test_merge_deduplicates_by_id() {
        let mut items = Vec::new();
        merge_message(&mut items, message("t1", 1));
        merge_message(&mut items, message("t1", 1));
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_send_requires_open_conversation() {
        let gateway = Arc::new(crate::gateway::MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let chat = ChatStream::new(gateway);
        assert!(chat.send("hello").await.is_err());
        assert!(!chat.is_sending());
    }

    #[tokio::test]
    async fn test_send_merges_without_waiting_for_echo() {
        let gateway = Arc::new(crate::gateway::MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let messages = Messages::new(gateway.clone());
        let conversation = messages.ensure_conversation("lin").await.unwrap();

        let chat = ChatStream::new(gateway);
        chat.open(&conversation).await;

        let sent = chat.send("hello lin").await.unwrap();
        assert!(!chat.is_sending());

        let snapshot = chat.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].id, sent.id);
    }
}
