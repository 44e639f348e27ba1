//! Post accessor: creation, scoped listing with view assembly, edits,
//! and cascading deletion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::FursatResult;
use crate::gateway::{
    buckets, decode_rows, require_user, tables, Filter, Gateway, OrderBy,
};
use crate::types::{AuthorProfile, LikeRecord, Post, PostRecord, ProfileRecord, SaveRecord};

use super::{blob_path_from_url, NewImage};

/// Filtering context for a post stream: the global feed or one circle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedScope {
    #[default]
    Global,
    Circle(String),
}

impl FeedScope {
    /// The row predicate selecting this scope's posts.
    pub fn filter(&self) -> Filter {
        match self {
            FeedScope::Global => Filter::IsNull("circle_id"),
            FeedScope::Circle(id) => Filter::Eq("circle_id", json!(id)),
        }
    }
}

/// Merge fetched row sets into post view models.
///
/// Pure function of its inputs: no ordering dependency between the lookup
/// sets, authors default to [`AuthorProfile::anonymous`] when unresolvable,
/// and the viewer-relative booleans come only from the supplied id sets
/// (empty sets for an unauthenticated viewer).
pub fn assemble_posts(
    posts: Vec<PostRecord>,
    profiles: &[ProfileRecord],
    likes: &[LikeRecord],
    viewer_likes: &HashSet<String>,
    viewer_saves: &HashSet<String>,
) -> Vec<Post> {
    let profile_map: HashMap<&str, &ProfileRecord> =
        profiles.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut like_counts: HashMap<&str, u64> = HashMap::new();
    for like in likes {
        *like_counts.entry(like.post_id.as_str()).or_default() += 1;
    }

    posts
        .into_iter()
        .map(|record| {
            let author = profile_map
                .get(record.user_id.as_str())
                .map(|p| AuthorProfile::from(*p))
                .unwrap_or_else(|| AuthorProfile::anonymous(record.user_id.clone()));
            Post {
                likes_count: like_counts.get(record.id.as_str()).copied().unwrap_or(0),
                is_liked: viewer_likes.contains(&record.id),
                is_saved: viewer_saves.contains(&record.id),
                author,
                id: record.id,
                user_id: record.user_id,
                content: record.content,
                image_url: record.image_url,
                circle_id: record.circle_id,
                created_at: record.created_at,
            }
        })
        .collect()
}

/// Post operations against the gateway.
#[derive(Clone)]
pub struct Posts {
    gateway: Arc<dyn Gateway>,
}

impl Posts {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Upload a post image and resolve its public URL.
    ///
    /// Paths are namespaced per author so deletion can recover them from
    /// the URL alone.
    pub async fn upload_post_image(&self, image: &NewImage) -> FursatResult<String> {
        let user = require_user(self.gateway.as_ref())?;
        let path = format!("posts/{}/{}.{}", user.id, Ulid::new(), image.extension);
        self.gateway
            .upload(buckets::POST_IMAGES, &path, image.bytes.clone())
            .await?;
        Ok(self.gateway.public_url(buckets::POST_IMAGES, &path))
    }

    /// Create a post, uploading the image first when one is attached.
    pub async fn create_post(
        &self,
        content: &str,
        image: Option<&NewImage>,
        circle_id: Option<&str>,
    ) -> FursatResult<PostRecord> {
        let user = require_user(self.gateway.as_ref())?;

        let image_url = match image {
            Some(image) => Some(self.upload_post_image(image).await?),
            None => None,
        };

        debug!(user_id = user.id.as_str(), ?circle_id, "creating post");
        let row = self
            .gateway
            .insert(
                tables::POSTS,
                json!({
                    "user_id": user.id,
                    "content": content,
                    "image_url": image_url,
                    "circle_id": circle_id,
                }),
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// List posts for a scope, newest first, with authors, like counts,
    /// and viewer-relative flags resolved.
    pub async fn list_posts(&self, scope: &FeedScope) -> FursatResult<Vec<Post>> {
        let rows = self
            .gateway
            .select(
                tables::POSTS,
                &[scope.filter()],
                Some(OrderBy::desc("created_at")),
            )
            .await?;
        let posts: Vec<PostRecord> = decode_rows(rows)?;

        // Short-circuit before the batch lookups; empty id sets would be
        // wasted calls.
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let author_ids: HashSet<&str> = posts.iter().map(|p| p.user_id.as_str()).collect();
        let author_ids: Vec<_> = author_ids.into_iter().map(|id| json!(id)).collect();
        let post_ids: Vec<_> = posts.iter().map(|p| json!(p.id)).collect();

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

        let mut viewer_likes = HashSet::new();
        let mut viewer_saves = HashSet::new();
        if let Some(user) = self.gateway.current_user() {
            let mine: Vec<LikeRecord> = decode_rows(
                self.gateway
                    .select(
                        tables::LIKES,
                        &[
                            Filter::Eq("user_id", json!(user.id)),
                            Filter::In("post_id", post_ids.clone()),
                        ],
                        None,
                    )
                    .await?,
            )?;
            viewer_likes = mine.into_iter().map(|l| l.post_id).collect();

            let saved: Vec<SaveRecord> = decode_rows(
                self.gateway
                    .select(
                        tables::SAVES,
                        &[
                            Filter::Eq("user_id", json!(user.id)),
                            Filter::In("post_id", post_ids),
                        ],
                        None,
                    )
                    .await?,
            )?;
            viewer_saves = saved.into_iter().map(|s| s.post_id).collect();
        }

        Ok(assemble_posts(
            posts,
            &profiles,
            &likes,
            &viewer_likes,
            &viewer_saves,
        ))
    }

    /// Edit a post's content.
    pub async fn update_post(&self, post_id: &str, content: &str) -> FursatResult<PostRecord> {
        let row = self
            .gateway
            .update(
                tables::POSTS,
                &[Filter::Eq("id", json!(post_id))],
                json!({ "content": content, "updated_at": chrono::Utc::now() }),
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Delete a post.
    ///
    /// Removes the uploaded image first, best-effort: a failed blob removal
    /// is logged and the record delete proceeds. Dependent likes and saves
    /// go with the record via the gateway's cascade.
    pub async fn delete_post(&self, post_id: &str) -> FursatResult<()> {
        let existing = self
            .gateway
            .select(tables::POSTS, &[Filter::Eq("id", json!(post_id))], None)
            .await?;
        let image_url = existing
            .first()
            .and_then(|row| row.get("image_url"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if let Some(url) = image_url {
            if let Some(path) = blob_path_from_url(&url, buckets::POST_IMAGES) {
                if let Err(err) = self
                    .gateway
                    .remove_blobs(buckets::POST_IMAGES, &[path])
                    .await
                {
                    warn!(post_id, %err, "post image removal failed; deleting record anyway");
                }
            }
        }

        self.gateway
            .delete(tables::POSTS, &[Filter::Eq("id", json!(post_id))])
            .await
    }
}
