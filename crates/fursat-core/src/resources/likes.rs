//! Like toggling and lookups.
//!
//! Likes are existence-only join rows on (user_id, post_id). Toggling is a
//! check-then-act: not atomic against concurrent toggles from other devices
//! for the same viewer, which the system accepts (see the gateway trait
//! notes); within one process the action controllers serialize per-post.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::error::FursatResult;
use crate::gateway::{require_user, tables, Filter, Gateway};

/// Like operations against the gateway.
#[derive(Clone)]
pub struct Likes {
    gateway: Arc<dyn Gateway>,
}

impl Likes {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Toggle the viewer's like on a post.
    ///
    /// Returns the new state: `true` when the post is now liked.
    pub async fn toggle_like(&self, post_id: &str) -> FursatResult<bool> {
        let user = require_user(self.gateway.as_ref())?;
        let filters = [
            Filter::Eq("user_id", json!(user.id)),
            Filter::Eq("post_id", json!(post_id)),
        ];

        let existing = self.gateway.select(tables::LIKES, &filters, None).await?;
        if existing.is_empty() {
            self.gateway
                .insert(
                    tables::LIKES,
                    json!({ "user_id": user.id, "post_id": post_id }),
                )
                .await?;
            debug!(post_id, "post liked");
            Ok(true)
        } else {
            self.gateway.delete(tables::LIKES, &filters).await?;
            debug!(post_id, "post unliked");
            Ok(false)
        }
    }

    /// Total number of likes on a post.
    pub async fn like_count(&self, post_id: &str) -> FursatResult<u64> {
        let rows = self
            .gateway
            .select(
                tables::LIKES,
                &[Filter::Eq("post_id", json!(post_id))],
                None,
            )
            .await?;
        Ok(rows.len() as u64)
    }

    /// Whether the current viewer has liked the post. A missing row and a
    /// missing viewer are both a plain `false`, never an error.
    pub async fn is_post_liked(&self, post_id: &str) -> FursatResult<bool> {
        let Some(user) = self.gateway.current_user() else {
            return Ok(false);
        };
        let rows = self
            .gateway
            .select(
                tables::LIKES,
                &[
                    Filter::Eq("user_id", json!(user.id)),
                    Filter::Eq("post_id", json!(post_id)),
                ],
                None,
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
