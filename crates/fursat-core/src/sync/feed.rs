//! Live post feed for one scope (global or a circle).
//!
//! Posts are mutable and their view rows depend on cross-table joins
//! (author profile, like counts, viewer flags), so any change event on the
//! watched scope triggers a full re-fetch rather than an in-place patch.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::gateway::{tables, Gateway};
use crate::resources::{FeedScope, Posts};
use crate::sync::{Shared, Snapshot};
use crate::types::Post;

/// Hook keeping a post feed current for its scope.
pub struct PostFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    gateway: Arc<dyn Gateway>,
    posts: Posts,
    scope: Mutex<FeedScope>,
    shared: Shared<Post>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PostFeed {
    pub fn new(gateway: Arc<dyn Gateway>, scope: FeedScope) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                posts: Posts::new(gateway.clone()),
                gateway,
                scope: Mutex::new(scope),
                shared: Shared::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to the current scope and run the initial fetch.
    pub async fn start(&self) {
        self.restart().await;
    }

    /// Switch scope. The old subscription closes before the new one opens;
    /// fetches still in flight for the old scope are discarded.
    pub async fn set_scope(&self, scope: FeedScope) {
        *self.inner.scope.lock() = scope;
        self.restart().await;
    }

    pub fn scope(&self) -> FeedScope {
        self.inner.scope.lock().clone()
    }

    pub fn snapshot(&self) -> Snapshot<Post> {
        self.inner.shared.snapshot()
    }

    /// Notified after every snapshot change.
    pub fn changed(&self) -> broadcast::Receiver<()> {
        self.inner.shared.subscribe_changed()
    }

    /// Re-fetch the current scope without touching the subscription.
    pub async fn refresh(&self) {
        let epoch = self.inner.shared.epoch();
        let scope = self.inner.scope.lock().clone();
        let result = self.inner.posts.list_posts(&scope).await;
        self.inner.shared.apply(epoch, result);
    }

    /// Stop listening and discard any in-flight fetch. Safe to call more
    /// than once.
    pub fn teardown(&self) {
        self.inner.shared.retire();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }

    async fn restart(&self) {
        let epoch = self.inner.shared.advance();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        let filter = self.inner.scope.lock().filter();
        match self.inner.gateway.subscribe(tables::POSTS, Some(filter)) {
            Ok(mut events) => {
                let inner = self.inner.clone();
                let task = tokio::spawn(async move {
                    while events.next().await.is_some() {
                        let epoch = inner.shared.epoch();
                        let scope = inner.scope.lock().clone();
                        let result = inner.posts.list_posts(&scope).await;
                        inner.shared.apply(epoch, result);
                    }
                });
                *self.inner.task.lock() = Some(task);
            }
            Err(err) => warn!(%err, "post feed subscription failed; feed will not live-update"),
        }

        let scope = self.inner.scope.lock().clone();
        let result = self.inner.posts.list_posts(&scope).await;
        self.inner.shared.apply(epoch, result);
    }
}

impl Drop for PostFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    async fn wait_for<F: Fn() -> bool>(feed_changed: &mut broadcast::Receiver<()>, done: F) {
        for _ in 0..16 {
            if done() {
                return;
            }
            let _ = tokio::time::timeout(std::time::Duration::from_millis(200), feed_changed.recv())
                .await;
        }
    }

    #[tokio::test]
    async fn test_feed_refetches_on_post_insert() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let posts = Posts::new(gateway.clone());

        let feed = PostFeed::new(gateway.clone(), FeedScope::Global);
        feed.start().await;
        assert!(feed.snapshot().items.is_empty());

        let mut changed = feed.changed();
        posts.create_post("hello campus", None, None).await.unwrap();
        wait_for(&mut changed, || feed.snapshot().items.len() == 1).await;

        let snapshot = feed.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].content, "hello campus");
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_scoped_feed_ignores_other_scopes() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let posts = Posts::new(gateway.clone());

        posts.create_post("global", None, None).await.unwrap();
        posts.create_post("in orbit", None, Some("orbit")).await.unwrap();

        let feed = PostFeed::new(gateway.clone(), FeedScope::Circle("orbit".to_string()));
        feed.start().await;
        let snapshot = feed.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].content, "in orbit");

        feed.set_scope(FeedScope::Global).await;
        let snapshot = feed.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].content, "global");
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent_and_discards_refresh() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("ada", "ada@campus.edu");
        let posts = Posts::new(gateway.clone());
        posts.create_post("hello", None, None).await.unwrap();

        let feed = PostFeed::new(gateway.clone(), FeedScope::Global);
        feed.start().await;
        assert_eq!(feed.snapshot().items.len(), 1);

        feed.teardown();
        feed.teardown();

        // A fetch resolving after teardown must not mutate the snapshot.
        posts.create_post("late", None, None).await.unwrap();
        feed.refresh().await;
        assert_eq!(feed.snapshot().items.len(), 1);
    }
}
