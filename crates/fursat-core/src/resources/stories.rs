//! Story accessor: upload, creation with 24h expiry, active queries, and
//! grouping for the story rail.
//!
//! Stories have no explicit "expire" mutation. Every active query filters
//! by `expires_at > now` at query time; expired records are swept later by
//! the out-of-band purge job (`story::purge`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::debug;
use ulid::Ulid;

use crate::error::FursatResult;
use crate::gateway::{buckets, decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::{AuthorProfile, ProfileRecord, Story, StoryGroup, StoryRecord};

use super::NewImage;

/// How long a story stays active.
pub const STORY_TTL_HOURS: i64 = 24;

/// Group one author's stories for the rail.
///
/// Pure: groups `stories` by author preserving their order, flags
/// `has_unviewed` from the supplied viewed-set, and keeps the author order
/// of first appearance. The caller excludes the current user's own stories
/// before grouping.
pub fn group_stories(stories: &[Story], viewed: &HashSet<String>) -> Vec<StoryGroup> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, StoryGroup> = HashMap::new();

    for story in stories {
        let group = groups.entry(story.user_id.as_str()).or_insert_with(|| {
            order.push(story.user_id.as_str());
            StoryGroup {
                user_id: story.user_id.clone(),
                username: story.author.username.clone(),
                avatar_url: story.author.avatar_url.clone(),
                stories: Vec::new(),
                has_unviewed: false,
            }
        });
        if !viewed.contains(&story.id) {
            group.has_unviewed = true;
        }
        group.stories.push(story.clone());
    }

    order
        .into_iter()
        .filter_map(|user_id| groups.remove(user_id))
        .collect()
}

/// Story operations against the gateway.
#[derive(Clone)]
pub struct Stories {
    gateway: Arc<dyn Gateway>,
}

impl Stories {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Upload a story image and resolve its public URL.
    pub async fn upload_story_image(&self, image: &NewImage) -> FursatResult<String> {
        require_user(self.gateway.as_ref())?;
        let path = format!("{}.{}", Ulid::new(), image.extension);
        self.gateway
            .upload(buckets::STORIES, &path, image.bytes.clone())
            .await?;
        Ok(self.gateway.public_url(buckets::STORIES, &path))
    }

    /// Publish a story that expires [`STORY_TTL_HOURS`] from now.
    pub async fn create_story(&self, image_url: &str) -> FursatResult<StoryRecord> {
        let user = require_user(self.gateway.as_ref())?;
        let expires_at = Utc::now() + Duration::hours(STORY_TTL_HOURS);

        debug!(user_id = user.id.as_str(), "creating story");
        let row = self
            .gateway
            .insert(
                tables::STORIES,
                json!({
                    "user_id": user.id,
                    "image_url": image_url,
                    "expires_at": expires_at,
                }),
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// All active stories, oldest first, with author summaries resolved.
    pub async fn active_stories(&self) -> FursatResult<Vec<Story>> {
        let rows = self
            .gateway
            .select(
                tables::STORIES,
                &[Filter::Gt("expires_at", json!(Utc::now()))],
                Some(OrderBy::asc("created_at")),
            )
            .await?;
        let records: Vec<StoryRecord> = decode_rows(rows)?;
        self.with_authors(records).await
    }

    /// One author's active stories, oldest first.
    pub async fn user_stories(&self, user_id: &str) -> FursatResult<Vec<Story>> {
        let rows = self
            .gateway
            .select(
                tables::STORIES,
                &[
                    Filter::Eq("user_id", json!(user_id)),
                    Filter::Gt("expires_at", json!(Utc::now())),
                ],
                Some(OrderBy::asc("created_at")),
            )
            .await?;
        let records: Vec<StoryRecord> = decode_rows(rows)?;
        self.with_authors(records).await
    }

    /// Delete a story record and, best-effort, its image blob.
    pub async fn delete_story(&self, story_id: &str) -> FursatResult<()> {
        let existing = self
            .gateway
            .select(tables::STORIES, &[Filter::Eq("id", json!(story_id))], None)
            .await?;
        let image_url = existing
            .first()
            .and_then(|row| row.get("image_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if let Some(url) = image_url {
            if let Some(path) = super::blob_path_from_url(&url, buckets::STORIES) {
                if let Err(err) = self.gateway.remove_blobs(buckets::STORIES, &[path]).await {
                    tracing::warn!(story_id, %err, "story image removal failed; deleting record anyway");
                }
            }
        }

        self.gateway
            .delete(tables::STORIES, &[Filter::Eq("id", json!(story_id))])
            .await
    }

    async fn with_authors(&self, records: Vec<StoryRecord>) -> FursatResult<Vec<Story>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: HashSet<&str> = records.iter().map(|s| s.user_id.as_str()).collect();
        let author_ids: Vec<_> = author_ids.into_iter().map(|id| json!(id)).collect();
        let profiles: Vec<ProfileRecord> = decode_rows(
            self.gateway
                .select(tables::PROFILES, &[Filter::In("id", author_ids)], None)
                .await?,
        )?;
        let profile_map: HashMap<&str, &ProfileRecord> =
            profiles.iter().map(|p| (p.id.as_str(), p)).collect();

        Ok(records
            .into_iter()
            .map(|record| {
                let author = profile_map
                    .get(record.user_id.as_str())
                    .map(|p| AuthorProfile::from(*p))
                    .unwrap_or_else(|| AuthorProfile::anonymous(record.user_id.clone()));
                Story {
                    author,
                    id: record.id,
                    user_id: record.user_id,
                    image_url: record.image_url,
                    created_at: record.created_at,
                    expires_at: record.expires_at,
                }
            })
            .collect())
    }
}
