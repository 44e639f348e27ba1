//! Live story rail: active stories grouped by author.
//!
//! Any change on the stories table triggers a re-fetch and regroup, since
//! expiry filtering and author joins make in-place patching unprofitable.
//! The viewer's own stories are split out of the groups; the rail renders
//! them separately.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::FursatResult;
use crate::gateway::{tables, Gateway};
use crate::resources::{group_stories, Stories};
use crate::story::ViewedStories;
use crate::sync::{Shared, Snapshot};
use crate::types::{Story, StoryGroup};

/// Hook keeping the story rail current, wired to the device-local
/// viewed-set for the unviewed ring indicator.
pub struct StoryRail {
    inner: Arc<RailInner>,
}

struct RailInner {
    gateway: Arc<dyn Gateway>,
    stories: Stories,
    viewed: Arc<ViewedStories>,
    /// Last fetched active stories, everyone's, ungrouped. Lets
    /// `mark_viewed` regroup without another fetch.
    active: Mutex<Vec<Story>>,
    shared: Shared<StoryGroup>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StoryRail {
    pub fn new(gateway: Arc<dyn Gateway>, viewed: Arc<ViewedStories>) -> Self {
        Self {
            inner: Arc::new(RailInner {
                stories: Stories::new(gateway.clone()),
                gateway,
                viewed,
                active: Mutex::new(Vec::new()),
                shared: Shared::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to story changes and run the initial fetch.
    pub async fn start(&self) {
        let epoch = self.inner.shared.advance();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        match self.inner.gateway.subscribe(tables::STORIES, None) {
            Ok(mut events) => {
                let inner = self.inner.clone();
                let task = tokio::spawn(async move {
                    while events.next().await.is_some() {
                        let epoch = inner.shared.epoch();
                        refetch(&inner, epoch).await;
                    }
                });
                *self.inner.task.lock() = Some(task);
            }
            Err(err) => warn!(%err, "story rail subscription failed; rail will not live-update"),
        }

        refetch(&self.inner, epoch).await;
    }

    pub fn snapshot(&self) -> Snapshot<StoryGroup> {
        self.inner.shared.snapshot()
    }

    pub fn changed(&self) -> broadcast::Receiver<()> {
        self.inner.shared.subscribe_changed()
    }

    /// The viewer's own active stories, excluded from the groups.
    pub fn own_stories(&self) -> Vec<Story> {
        let viewer = self.inner.gateway.current_user().map(|u| u.id);
        self.inner
            .active
            .lock()
            .iter()
            .filter(|story| Some(&story.user_id) == viewer.as_ref())
            .cloned()
            .collect()
    }

    pub async fn refresh(&self) {
        let epoch = self.inner.shared.epoch();
        refetch(&self.inner, epoch).await;
    }

    /// Persist a story as viewed and regroup locally so the ring indicator
    /// updates without waiting for a fetch.
    pub fn mark_viewed(&self, story_id: &str) -> FursatResult<()> {
        self.inner.viewed.mark_viewed(story_id)?;
        let epoch = self.inner.shared.epoch();
        let groups = self.regroup();
        self.inner.shared.apply(epoch, Ok(groups));
        Ok(())
    }

    pub fn is_viewed(&self, story_id: &str) -> bool {
        self.inner.viewed.contains(story_id)
    }

    /// Stop listening. Safe to call more than once.
    pub fn teardown(&self) {
        self.inner.shared.retire();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }

    fn regroup(&self) -> Vec<StoryGroup> {
        regroup(&self.inner)
    }
}

fn regroup(inner: &RailInner) -> Vec<StoryGroup> {
    let viewer = inner.gateway.current_user().map(|u| u.id);
    let active = inner.active.lock();
    let others: Vec<Story> = active
        .iter()
        .filter(|story| Some(&story.user_id) != viewer.as_ref())
        .cloned()
        .collect();
    group_stories(&others, &inner.viewed.snapshot())
}

async fn refetch(inner: &Arc<RailInner>, epoch: u64) {
    match inner.stories.active_stories().await {
        Ok(stories) => {
            *inner.active.lock() = stories;
            let groups = regroup(inner);
            inner.shared.apply(epoch, Ok(groups));
        }
        Err(err) => {
            inner.shared.apply(epoch, Err(err));
        }
    }
}

impl Drop for StoryRail {
    fn drop(&mut self) {
        self.teardown();
    }
}
