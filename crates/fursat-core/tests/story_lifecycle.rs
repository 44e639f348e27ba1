//! Story lifecycle end to end: the 24-hour activity window, the device-local
//! viewed-set, the rail, and the purge job.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fursat_core::gateway::tables;
use fursat_core::{
    purge_expired_stories, Gateway, MemoryGateway, Stories, StoryRail, ViewedStories,
};
use serde_json::json;
use tempfile::TempDir;

async fn insert_story_expiring_in(gateway: &MemoryGateway, user: &str, ttl: Duration) -> String {
    let row = gateway
        .insert(
            tables::STORIES,
            json!({
                "user_id": user,
                "image_url": format!("https://blobs.fursat.app/stories/{}.jpg", user),
                "expires_at": Utc::now() + ttl,
            }),
        )
        .await
        .unwrap();
    row["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_activity_window_boundary() {
    let gateway = Arc::new(MemoryGateway::new());
    let stories = Stories::new(gateway.clone());

    // One story was posted 23h59m ago, one 24h01m ago.
    let fresh = insert_story_expiring_in(&gateway, "ada", Duration::minutes(1)).await;
    insert_story_expiring_in(&gateway, "lin", -Duration::minutes(1)).await;

    let active = stories.active_stories().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, fresh);
}

#[tokio::test]
async fn test_created_story_expires_24h_out() {
    let gateway = Arc::new(MemoryGateway::new());
    let stories = Stories::new(gateway.clone());
    gateway.sign_in("ada", "ada@campus.edu");

    let before = Utc::now();
    let story = stories
        .create_story("https://blobs.fursat.app/stories/a.jpg")
        .await
        .unwrap();
    let ttl = story.expires_at - story.created_at;
    assert_eq!(ttl.num_hours(), 24);
    assert!(story.created_at >= before);
}

#[tokio::test]
async fn test_viewed_set_persists_across_rail_sessions() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("viewed.redb");
    let gateway = Arc::new(MemoryGateway::new());
    gateway.sign_in("ada", "ada@campus.edu");

    let story_id = insert_story_expiring_in(&gateway, "lin", Duration::hours(24)).await;

    // First session: view the story.
    {
        let viewed = Arc::new(ViewedStories::open(&store_path).unwrap());
        let rail = StoryRail::new(gateway.clone(), viewed);
        rail.start().await;
        assert!(rail.snapshot().items[0].has_unviewed);

        rail.mark_viewed(&story_id).unwrap();
        assert!(!rail.snapshot().items[0].has_unviewed);
        rail.teardown();
    }

    // Second session, same device: the ring stays read.
    let viewed = Arc::new(ViewedStories::open(&store_path).unwrap());
    assert!(viewed.contains(&story_id));
    let rail = StoryRail::new(gateway.clone(), viewed);
    rail.start().await;
    assert!(!rail.snapshot().items[0].has_unviewed);
}

#[tokio::test]
async fn test_purge_then_rail_shows_nothing() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.sign_in("ada", "ada@campus.edu");
    insert_story_expiring_in(&gateway, "lin", -Duration::hours(1)).await;
    insert_story_expiring_in(&gateway, "kai", -Duration::hours(2)).await;

    assert_eq!(purge_expired_stories(gateway.as_ref()).await.unwrap(), 2);
    assert_eq!(gateway.table_len(tables::STORIES), 0);

    let dir = TempDir::new().unwrap();
    let viewed = Arc::new(ViewedStories::open(dir.path().join("viewed.redb")).unwrap());
    let rail = StoryRail::new(gateway.clone(), viewed);
    rail.start().await;
    assert!(rail.snapshot().items.is_empty());
    assert!(rail.snapshot().error.is_none());
}

#[tokio::test]
async fn test_delete_story_removes_blob_and_record() {
    let gateway = Arc::new(MemoryGateway::new());
    let stories = Stories::new(gateway.clone());
    gateway.sign_in("ada", "ada@campus.edu");

    let image = fursat_core::NewImage::new(bytes::Bytes::from_static(b"img"), "jpg");
    let url = stories.upload_story_image(&image).await.unwrap();
    let story = stories.create_story(&url).await.unwrap();

    let path = url
        .split_once("/stories/")
        .map(|(_, p)| p.to_string())
        .unwrap();
    assert!(gateway.blob_exists("stories", &path));

    stories.delete_story(&story.id).await.unwrap();
    assert!(!gateway.blob_exists("stories", &path));
    assert_eq!(gateway.table_len(tables::STORIES), 0);
}
