//! Direct-message accessor: conversation lookup/creation, inbox assembly,
//! message history, and sending.
//!
//! Conversations carry exactly two participants here. Message rows are
//! append-only and immutable, which is what allows the chat hook to merge
//! them incrementally instead of re-fetching.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::error::FursatResult;
use crate::gateway::{decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::{
    AuthorProfile, Conversation, ConversationMemberRecord, ConversationRecord, LastMessage,
    MessageRecord, ProfileRecord,
};

/// Message operations against the gateway.
#[derive(Clone)]
pub struct Messages {
    gateway: Arc<dyn Gateway>,
}

impl Messages {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Find the conversation shared with `other_user_id`, or create one
    /// with both membership rows. Returns the conversation id.
    pub async fn ensure_conversation(&self, other_user_id: &str) -> FursatResult<String> {
        let user = require_user(self.gateway.as_ref())?;

        let mine: Vec<ConversationMemberRecord> = decode_rows(
            self.gateway
                .select(
                    tables::CONVERSATION_MEMBERS,
                    &[Filter::Eq("user_id", json!(user.id))],
                    None,
                )
                .await?,
        )?;

        if !mine.is_empty() {
            let my_ids: Vec<_> = mine.iter().map(|m| json!(m.conversation_id)).collect();
            let shared = self
                .gateway
                .select(
                    tables::CONVERSATION_MEMBERS,
                    &[
                        Filter::Eq("user_id", json!(other_user_id)),
                        Filter::In("conversation_id", my_ids),
                    ],
                    None,
                )
                .await?;
            if let Some(existing) = shared.first() {
                if let Some(id) = existing.get("conversation_id").and_then(|v| v.as_str()) {
                    return Ok(id.to_string());
                }
            }
        }

        let conversation: ConversationRecord = serde_json::from_value(
            self.gateway
                .insert(tables::CONVERSATIONS, json!({}))
                .await?,
        )?;
        let conversation_id = conversation.id;

        for participant in [user.id.as_str(), other_user_id] {
            self.gateway
                .insert(
                    tables::CONVERSATION_MEMBERS,
                    json!({
                        "conversation_id": conversation_id,
                        "user_id": participant,
                    }),
                )
                .await?;
        }

        debug!(conversation_id = conversation_id.as_str(), "conversation created");
        Ok(conversation_id)
    }

    /// The viewer's inbox: each conversation with the other participant's
    /// profile and the latest message, sorted by `last_message_at`
    /// descending.
    pub async fn list_conversations(&self) -> FursatResult<Vec<Conversation>> {
        let user = require_user(self.gateway.as_ref())?;

        let mine: Vec<ConversationMemberRecord> = decode_rows(
            self.gateway
                .select(
                    tables::CONVERSATION_MEMBERS,
                    &[Filter::Eq("user_id", json!(user.id))],
                    None,
                )
                .await?,
        )?;
        if mine.is_empty() {
            return Ok(Vec::new());
        }
        let my_ids: Vec<_> = mine.iter().map(|m| json!(m.conversation_id)).collect();

        let conversations: Vec<ConversationRecord> = decode_rows(
            self.gateway
                .select(tables::CONVERSATIONS, &[Filter::In("id", my_ids.clone())], None)
                .await?,
        )?;

        let all_members: Vec<ConversationMemberRecord> = decode_rows(
            self.gateway
                .select(
                    tables::CONVERSATION_MEMBERS,
                    &[Filter::In("conversation_id", my_ids.clone())],
                    None,
                )
                .await?,
        )?;
        let mut other_by_conversation: HashMap<&str, &str> = HashMap::new();
        for member in &all_members {
            if member.user_id != user.id {
                other_by_conversation
                    .insert(member.conversation_id.as_str(), member.user_id.as_str());
            }
        }

        let other_ids: HashSet<&str> = other_by_conversation.values().copied().collect();
        let other_ids: Vec<_> = other_ids.into_iter().map(|id| json!(id)).collect();
        let profiles: Vec<ProfileRecord> = decode_rows(
            self.gateway
                .select(tables::PROFILES, &[Filter::In("id", other_ids)], None)
                .await?,
        )?;
        let profile_map: HashMap<&str, &ProfileRecord> =
            profiles.iter().map(|p| (p.id.as_str(), p)).collect();

        // Latest message per conversation from one batch fetch.
        let messages: Vec<MessageRecord> = decode_rows(
            self.gateway
                .select(
                    tables::MESSAGES,
                    &[Filter::In("conversation_id", my_ids)],
                    Some(OrderBy::asc("created_at")),
                )
                .await?,
        )?;
        let mut last_by_conversation: HashMap<&str, &MessageRecord> = HashMap::new();
        for message in &messages {
            last_by_conversation.insert(message.conversation_id.as_str(), message);
        }

        let mut assembled: Vec<Conversation> = conversations
            .into_iter()
            .map(|record| {
                let other_user = other_by_conversation
                    .get(record.id.as_str())
                    .map(|other_id| {
                        profile_map
                            .get(other_id)
                            .map(|p| AuthorProfile::from(*p))
                            .unwrap_or_else(|| AuthorProfile::anonymous(*other_id))
                    })
                    .unwrap_or_else(|| AuthorProfile::anonymous("unknown"));
                let last_message =
                    last_by_conversation
                        .get(record.id.as_str())
                        .map(|m| LastMessage {
                            content: m.content.clone(),
                            sender_id: m.sender_id.clone(),
                            created_at: m.created_at,
                        });
                Conversation {
                    other_user,
                    last_message,
                    id: record.id,
                    created_at: record.created_at,
                    last_message_at: record.last_message_at,
                }
            })
            .collect();

        assembled.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(assembled)
    }

    /// Message history for one conversation, oldest first.
    pub async fn list_messages(&self, conversation_id: &str) -> FursatResult<Vec<MessageRecord>> {
        decode_rows(
            self.gateway
                .select(
                    tables::MESSAGES,
                    &[Filter::Eq("conversation_id", json!(conversation_id))],
                    Some(OrderBy::asc("created_at")),
                )
                .await?,
        )
    }

    /// Send a message and advance the conversation's `last_message_at`.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> FursatResult<MessageRecord> {
        let user = require_user(self.gateway.as_ref())?;

        let row = self
            .gateway
            .insert(
                tables::MESSAGES,
                json!({
                    "conversation_id": conversation_id,
                    "sender_id": user.id,
                    "content": content,
                }),
            )
            .await?;
        let message: MessageRecord = serde_json::from_value(row)?;

        self.gateway
            .update(
                tables::CONVERSATIONS,
                &[Filter::Eq("id", json!(conversation_id))],
                json!({ "last_message_at": Utc::now() }),
            )
            .await?;

        debug!(conversation_id, "message sent");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn setup() -> (Arc<MemoryGateway>, Messages) {
        let gateway = Arc::new(MemoryGateway::new());
        let messages = Messages::new(gateway.clone());
        (gateway, messages)
    }

    #[tokio::test]
    async fn test_ensure_conversation_is_idempotent() {
        let (gateway, messages) = setup();
        gateway.sign_in("ada", "ada@campus.edu");
        let first = messages.ensure_conversation("lin").await.unwrap();
        let second = messages.ensure_conversation("lin").await.unwrap();
        assert_eq!(first, second);

        // The other participant resolves to the same conversation.
        gateway.sign_in("lin", "lin@campus.edu");
        let theirs = messages.ensure_conversation("ada").await.unwrap();
        assert_eq!(first, theirs);
    }

    #[tokio::test]
    async fn test_messages_ordered_ascending() {
        let (gateway, messages) = setup();
        gateway.sign_in("ada", "ada@campus.edu");
        let conversation = messages.ensure_conversation("lin").await.unwrap();
        messages.send_message(&conversation, "one").await.unwrap();
        messages.send_message(&conversation, "two").await.unwrap();

        let history = messages.list_messages(&conversation).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "one");
        assert_eq!(history[1].content, "two");
        assert!(history[0].created_at <= history[1].created_at);
    }

    #[tokio::test]
    async fn test_inbox_sorted_by_last_message_desc() {
        let (gateway, messages) = setup();
        gateway.sign_in("ada", "ada@campus.edu");
        let with_lin = messages.ensure_conversation("lin").await.unwrap();
        let with_kai = messages.ensure_conversation("kai").await.unwrap();

        messages.send_message(&with_lin, "hi lin").await.unwrap();
        messages.send_message(&with_kai, "hi kai").await.unwrap();

        let inbox = messages.list_conversations().await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].id, with_kai);
        assert_eq!(inbox[1].id, with_lin);
        assert_eq!(inbox[0].last_message.as_ref().unwrap().content, "hi kai");
        // No profile rows exist for the other users; defensive default.
        assert_eq!(inbox[0].other_user.username, crate::types::ANONYMOUS_USERNAME);
    }

    #[tokio::test]
    async fn test_inbox_requires_authentication() {
        let (_, messages) = setup();
        assert!(matches!(
            messages.list_conversations().await.unwrap_err(),
            crate::error::FursatError::NotAuthenticated
        ));
    }
}
