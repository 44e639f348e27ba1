//! Expired-story purge job.
//!
//! Active queries already filter stories by `expires_at > now`; this job
//! only reclaims storage. It runs out of band (scheduled, or opportunistic
//! on app start) and is idempotent: the candidate set shrinks to empty and
//! stays there.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::FursatResult;
use crate::gateway::{buckets, decode_rows, tables, Filter, Gateway};
use crate::resources::blob_path_from_url;
use crate::types::StoryRecord;

/// Delete every story whose expiry has passed, blobs first (best-effort),
/// then records. Returns the number of records removed.
pub async fn purge_expired_stories(gateway: &dyn Gateway) -> FursatResult<usize> {
    let rows = gateway
        .select(
            tables::STORIES,
            &[Filter::Lt("expires_at", json!(Utc::now()))],
            None,
        )
        .await?;
    if rows.is_empty() {
        debug!("no expired stories to purge");
        return Ok(0);
    }
    let expired: Vec<StoryRecord> = decode_rows(rows)?;

    // A failed blob removal must not keep the record (and its re-upload
    // path) alive; orphaned blobs are reclaimed on a later run or by
    // bucket lifecycle rules.
    let paths: Vec<String> = expired
        .iter()
        .filter_map(|story| blob_path_from_url(&story.image_url, buckets::STORIES))
        .collect();
    if !paths.is_empty() {
        if let Err(err) = gateway.remove_blobs(buckets::STORIES, &paths).await {
            warn!(%err, count = paths.len(), "expired story blob removal failed; deleting records anyway");
        }
    }

    let ids: Vec<_> = expired.iter().map(|story| json!(story.id)).collect();
    gateway.delete(tables::STORIES, &[Filter::In("id", ids)]).await?;

    info!(count = expired.len(), "purged expired stories");
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use chrono::Duration;

    async fn insert_story(gateway: &MemoryGateway, id_hint: &str, expired: bool) -> String {
        let offset = if expired {
            -Duration::hours(1)
        } else {
            Duration::hours(1)
        };
        let row = gateway
            .insert(
                tables::STORIES,
                json!({
                    "user_id": "ada",
                    "image_url": format!("https://blobs.fursat.app/stories/{}.jpg", id_hint),
                    "expires_at": Utc::now() + offset,
                }),
            )
            .await
            .unwrap();
        row["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let gateway = MemoryGateway::new();
        insert_story(&gateway, "old", true).await;
        insert_story(&gateway, "older", true).await;
        let live = insert_story(&gateway, "live", false).await;

        assert_eq!(purge_expired_stories(&gateway).await.unwrap(), 2);
        let remaining = gateway.select(tables::STORIES, &[], None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["id"], json!(live));

        // Second run is a no-op.
        assert_eq!(purge_expired_stories(&gateway).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_survives_blob_removal_failure() {
        let gateway = MemoryGateway::new();
        insert_story(&gateway, "old", true).await;
        gateway.set_blob_removal_failure(true);

        assert_eq!(purge_expired_stories(&gateway).await.unwrap(), 1);
        assert!(gateway
            .select(tables::STORIES, &[], None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_purge_empty_table_is_noop() {
        let gateway = MemoryGateway::new();
        assert_eq!(purge_expired_stories(&gateway).await.unwrap(), 0);
    }
}
