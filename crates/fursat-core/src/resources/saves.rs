//! Save toggling and the saved-posts list.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::error::FursatResult;
use crate::gateway::{decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::{LikeRecord, Post, PostRecord, ProfileRecord, SaveRecord};

use super::assemble_posts;

/// Save operations against the gateway.
#[derive(Clone)]
pub struct Saves {
    gateway: Arc<dyn Gateway>,
}

impl Saves {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Toggle the viewer's save on a post. Same check-then-act shape as
    /// like toggling; returns `true` when the post is now saved.
    pub async fn toggle_save(&self, post_id: &str) -> FursatResult<bool> {
        let user = require_user(self.gateway.as_ref())?;
        let filters = [
            Filter::Eq("user_id", json!(user.id)),
            Filter::Eq("post_id", json!(post_id)),
        ];

        let existing = self.gateway.select(tables::SAVES, &filters, None).await?;
        if existing.is_empty() {
            self.gateway
                .insert(
                    tables::SAVES,
                    json!({ "user_id": user.id, "post_id": post_id }),
                )
                .await?;
            debug!(post_id, "post saved");
            Ok(true)
        } else {
            self.gateway.delete(tables::SAVES, &filters).await?;
            debug!(post_id, "post unsaved");
            Ok(false)
        }
    }

    /// Whether the current viewer has saved the post; `false` with no
    /// viewer or no row.
    pub async fn is_post_saved(&self, post_id: &str) -> FursatResult<bool> {
        let Some(user) = self.gateway.current_user() else {
            return Ok(false);
        };
        let rows = self
            .gateway
            .select(
                tables::SAVES,
                &[
                    Filter::Eq("user_id", json!(user.id)),
                    Filter::Eq("post_id", json!(post_id)),
                ],
                None,
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// The viewer's saved posts, most recently saved first, assembled like
    /// a feed (`is_saved` is forced true: every row here is saved).
    pub async fn list_saved_posts(&self) -> FursatResult<Vec<Post>> {
        let user = require_user(self.gateway.as_ref())?;

        let saves: Vec<SaveRecord> = decode_rows(
            self.gateway
                .select(
                    tables::SAVES,
                    &[Filter::Eq("user_id", json!(user.id))],
                    Some(OrderBy::desc("created_at")),
                )
                .await?,
        )?;
        if saves.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<_> = saves.iter().map(|s| json!(s.post_id)).collect();
        let posts: Vec<PostRecord> = decode_rows(
            self.gateway
                .select(tables::POSTS, &[Filter::In("id", post_ids.clone())], None)
                .await?,
        )?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: HashSet<&str> = posts.iter().map(|p| p.user_id.as_str()).collect();
        let author_ids: Vec<_> = author_ids.into_iter().map(|id| json!(id)).collect();
        let profiles: Vec<ProfileRecord> = decode_rows(
            self.gateway
                .select(tables::PROFILES, &[Filter::In("id", author_ids)], None)
                .await?,
        )?;

        let likes: Vec<LikeRecord> = decode_rows(
            self.gateway
                .select(
                    tables::LIKES,
                    &[Filter::In("post_id", post_ids.clone())],
                    None,
                )
                .await?,
        )?;

        let mine: Vec<LikeRecord> = decode_rows(
            self.gateway
                .select(
                    tables::LIKES,
                    &[
                        Filter::Eq("user_id", json!(user.id)),
                        Filter::In("post_id", post_ids),
                    ],
                    None,
                )
                .await?,
        )?;
        let viewer_likes: HashSet<String> = mine.into_iter().map(|l| l.post_id).collect();
        let viewer_saves: HashSet<String> = saves.iter().map(|s| s.post_id.clone()).collect();

        let mut assembled =
            assemble_posts(posts, &profiles, &likes, &viewer_likes, &viewer_saves);

        // Order by save recency, not post creation time.
        let rank: std::collections::HashMap<&str, usize> = saves
            .iter()
            .enumerate()
            .map(|(i, s)| (s.post_id.as_str(), i))
            .collect();
        assembled.sort_by_key(|post| rank.get(post.id.as_str()).copied().unwrap_or(usize::MAX));

        Ok(assembled)
    }
}
