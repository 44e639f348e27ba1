//! Action controllers: duplicate suppression for user-triggered mutations.
//!
//! Double-clicking "like" must produce one mutation, not two. Each
//! controller keeps a named in-flight id set; a second trigger for an id
//! already in flight is suppressed and reported as `None`. Failures are
//! surfaced to the UI as [`Notice`] broadcast values rather than panics or
//! silent drops, and the in-flight entry always clears on settlement.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::FursatResult;
use crate::gateway::Gateway;
use crate::resources::{Likes, Posts, Saves, Stories};

const NOTICE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Info,
    Error,
}

/// A user-visible notification (the toast stand-in).
#[derive(Debug, Clone)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Error,
            message: message.into(),
        }
    }
}

/// Named in-flight id set.
pub struct ActionController {
    name: &'static str,
    in_flight: Mutex<HashSet<String>>,
}

impl ActionController {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `id`. Returns false when an action for it is already in
    /// flight, in which case the caller must drop the trigger.
    pub fn begin(&self, id: &str) -> bool {
        let claimed = self.in_flight.lock().insert(id.to_string());
        if !claimed {
            debug!(action = self.name, id, "duplicate trigger suppressed");
        }
        claimed
    }

    /// Release `id` after the action settles, success or failure.
    pub fn finish(&self, id: &str) {
        self.in_flight.lock().remove(id);
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.lock().contains(id)
    }
}

/// Post-level actions with duplicate suppression and failure notices.
pub struct PostActions {
    likes: Likes,
    saves: Saves,
    posts: Posts,
    liking: ActionController,
    saving: ActionController,
    deleting: ActionController,
    notices: broadcast::Sender<Notice>,
}

impl PostActions {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            likes: Likes::new(gateway.clone()),
            saves: Saves::new(gateway.clone()),
            posts: Posts::new(gateway),
            liking: ActionController::new("like"),
            saving: ActionController::new("save"),
            deleting: ActionController::new("delete"),
            notices,
        }
    }

    /// Subscribe to user-visible notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Toggle the viewer's like. `Ok(None)` means a toggle for this post
    /// was already in flight and the trigger was dropped; `Ok(Some(state))`
    /// is the new liked state.
    pub async fn toggle_like(&self, post_id: &str) -> FursatResult<Option<bool>> {
        if !self.liking.begin(post_id) {
            return Ok(None);
        }
        let result = self.likes.toggle_like(post_id).await;
        self.liking.finish(post_id);
        match result {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(post_id, %err, "like toggle failed");
                self.notify(Notice::error("Could not update like"));
                Err(err)
            }
        }
    }

    /// Toggle the viewer's save, with the same contract as `toggle_like`.
    pub async fn toggle_save(&self, post_id: &str) -> FursatResult<Option<bool>> {
        if !self.saving.begin(post_id) {
            return Ok(None);
        }
        let result = self.saves.toggle_save(post_id).await;
        self.saving.finish(post_id);
        match result {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(post_id, %err, "save toggle failed");
                self.notify(Notice::error("Could not update save"));
                Err(err)
            }
        }
    }

    /// Delete a post. `Ok(None)` means a delete was already in flight.
    pub async fn delete_post(&self, post_id: &str) -> FursatResult<Option<()>> {
        if !self.deleting.begin(post_id) {
            return Ok(None);
        }
        let result = self.posts.delete_post(post_id).await;
        self.deleting.finish(post_id);
        match result {
            Ok(()) => Ok(Some(())),
            Err(err) => {
                warn!(post_id, %err, "post delete failed");
                self.notify(Notice::error("Could not delete post"));
                Err(err)
            }
        }
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }
}

/// Story deletion with the same suppression and notice contract as
/// [`PostActions`]. The story viewer calls this while playback is paused;
/// the playback controller is told separately via `note_deleted`.
pub struct StoryActions {
    stories: Stories,
    deleting: ActionController,
    notices: broadcast::Sender<Notice>,
}

impl StoryActions {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            stories: Stories::new(gateway),
            deleting: ActionController::new("delete-story"),
            notices,
        }
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Delete a story. `Ok(None)` means a delete was already in flight.
    pub async fn delete_story(&self, story_id: &str) -> FursatResult<Option<()>> {
        if !self.deleting.begin(story_id) {
            return Ok(None);
        }
        let result = self.stories.delete_story(story_id).await;
        self.deleting.finish(story_id);
        match result {
            Ok(()) => Ok(Some(())),
            Err(err) => {
                warn!(story_id, %err, "story delete failed");
                let _ = self.notices.send(Notice::error("Could not delete story"));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[test]
    fn test_controller_suppresses_while_in_flight() {
        let controller = ActionController::new("like");
        assert!(controller.begin("p1"));
        assert!(!controller.begin("p1"));
        assert!(controller.begin("p2"));

        controller.finish("p1");
        assert!(controller.begin("p1"));
    }

    #[tokio::test]
    async fn test_toggle_like_roundtrip_and_clearing() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let post = Posts::new(gateway.clone())
            .create_post("hello", None, None)
            .await
            .unwrap();

        let actions = PostActions::new(gateway.clone());
        assert_eq!(actions.toggle_like(&post.id).await.unwrap(), Some(true));
        assert_eq!(actions.toggle_like(&post.id).await.unwrap(), Some(false));
        assert!(!actions.liking.is_in_flight(&post.id));
    }

    #[tokio::test]
    async fn test_failed_action_emits_notice_and_clears() {
        let gateway = Arc::new(MemoryGateway::new());
        // Not signed in: the toggle fails.
        let actions = PostActions::new(gateway);
        let mut notices = actions.notices();

        assert!(actions.toggle_like("p1").await.is_err());
        assert!(!actions.liking.is_in_flight("p1"));

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.severity, NoticeSeverity::Error);
    }

    #[tokio::test]
    async fn test_delete_story_suppression_and_settlement() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let story = Stories::new(gateway.clone())
            .create_story("https://blobs.fursat.app/stories/a.jpg")
            .await
            .unwrap();

        let actions = StoryActions::new(gateway);
        actions.deleting.begin(&story.id);
        assert_eq!(actions.delete_story(&story.id).await.unwrap(), None);

        actions.deleting.finish(&story.id);
        assert_eq!(actions.delete_story(&story.id).await.unwrap(), Some(()));
        assert!(!actions.deleting.is_in_flight(&story.id));
    }

    #[tokio::test]
    async fn test_delete_post_suppression() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let post = Posts::new(gateway.clone())
            .create_post("hello", None, None)
            .await
            .unwrap();

        let actions = PostActions::new(gateway);
        actions.deleting.begin(&post.id);
        assert_eq!(actions.delete_post(&post.id).await.unwrap(), None);

        actions.deleting.finish(&post.id);
        assert_eq!(actions.delete_post(&post.id).await.unwrap(), Some(()));
    }
}
