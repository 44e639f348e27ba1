//! Core types for the Fursat synchronization layer
//!
//! Two families live here:
//!
//! - *Wire records* (`PostRecord`, `LikeRecord`, ...): flat rows as the
//!   gateway stores and returns them, one struct per table.
//! - *View models* (`Post`, `Story`, `Circle`, `Conversation`): denormalized,
//!   read-optimized assemblies of one or more records plus viewer-relative
//!   derived fields (`is_liked`, `is_member`, ...). View models are produced
//!   by the resource accessors, never fetched directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder username for authors whose profile row cannot be resolved.
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

// ═══════════════════════════════════════════════════════════════════════
// Wire records
// ═══════════════════════════════════════════════════════════════════════

/// A row in the `posts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// `None` scopes the post to the global feed.
    #[serde(default)]
    pub circle_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A row in the `likes` table. Existence-only join row keyed by
/// (user_id, post_id); toggled, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

/// A row in the `saves` table. Same shape and semantics as [`LikeRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

/// A row in the `stories` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: String,
    pub user_id: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    /// Always `created_at + 24h`; a story is active iff `now < expires_at`.
    pub expires_at: DateTime<Utc>,
}

/// A row in the `circles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Membership role within a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Moderator,
    Member,
}

/// A row in the `circle_members` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleMemberRecord {
    pub circle_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// A row in the `conversations` table. Participants live in
/// `conversation_members`; exactly two in the current scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Advanced on every send; conversation lists sort by this, descending.
    pub last_message_at: DateTime<Utc>,
}

/// A row in the `conversation_members` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemberRecord {
    pub conversation_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A row in the `messages` table. Append-only and immutable; ordered by
/// `created_at` ascending within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// A row in the `profiles` table. `id` is shared with the auth identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub email: String,
    /// Nullable until the user picks one at signup.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A row in the `skills` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A row in the `projects` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row in the `news_posts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub summary: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════
// View models
// ═══════════════════════════════════════════════════════════════════════

/// Resolved author summary attached to posts, stories, and conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl AuthorProfile {
    /// Defensive default for an author id with no resolvable profile row.
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: ANONYMOUS_USERNAME.to_string(),
            full_name: None,
            avatar_url: None,
        }
    }
}

impl From<&ProfileRecord> for AuthorProfile {
    fn from(record: &ProfileRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record
                .username
                .clone()
                .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string()),
            full_name: record.full_name.clone(),
            avatar_url: record.avatar_url.clone(),
        }
    }
}

/// A feed post with author and viewer-relative fields resolved.
///
/// `is_liked` and `is_saved` are always relative to the currently signed-in
/// viewer and are recomputed on every assembly; with no viewer they are
/// `false` regardless of the underlying rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub circle_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: AuthorProfile,
    pub likes_count: u64,
    pub is_liked: bool,
    pub is_saved: bool,
}

/// An active story with its author summary resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub user_id: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub author: AuthorProfile,
}

impl Story {
    /// Whether the story is still active at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// One author's active stories, grouped for the story rail.
///
/// Derived, never persisted. `has_unviewed` is computed from the viewer's
/// local viewed-set and is therefore device-local.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryGroup {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub stories: Vec<Story>,
    pub has_unviewed: bool,
}

/// A circle with aggregate and viewer-relative fields resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub cover_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub member_count: u64,
    pub is_member: bool,
}

/// Most recent message summary shown in the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation as shown in the viewer's inbox: the non-viewer
/// participant's profile plus the latest message.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub other_user: AuthorProfile,
    pub last_message: Option<LastMessage>,
}
