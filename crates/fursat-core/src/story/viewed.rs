//! Device-local viewed-story set.
//!
//! Which stories the viewer has already watched is personal, device-local
//! state: it is never synchronized through the gateway and survives app
//! restarts. Ids are only ever added; expired ids become harmless garbage
//! that stops mattering once the story no longer appears in any query.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::FursatResult;

/// story_id -> unix millis the story was first viewed at.
const VIEWED_TABLE: TableDefinition<&str, i64> = TableDefinition::new("viewed_stories");

/// Persistent set of story ids the viewer has watched on this device.
///
/// All reads hit an in-memory cache loaded at open; only `mark_viewed`
/// touches the database.
pub struct ViewedStories {
    db: Database,
    cache: RwLock<HashSet<String>>,
}

impl ViewedStories {
    /// Open (or create) the store at `path` and load the full id set.
    pub fn open(path: impl AsRef<Path>) -> FursatResult<Self> {
        let db = Database::create(path)?;

        // Creating the table up front keeps the read path infallible.
        let write = db.begin_write()?;
        write.open_table(VIEWED_TABLE)?;
        write.commit()?;

        let mut cache = HashSet::new();
        let read = db.begin_read()?;
        let table = read.open_table(VIEWED_TABLE)?;
        for entry in table.iter()? {
            let (key, _) = entry?;
            cache.insert(key.value().to_string());
        }
        debug!(count = cache.len(), "viewed-story set loaded");

        Ok(Self {
            db,
            cache: RwLock::new(cache),
        })
    }

    /// Record that a story has been viewed. Idempotent; returns false when
    /// the id was already present.
    pub fn mark_viewed(&self, story_id: &str) -> FursatResult<bool> {
        if self.cache.read().contains(story_id) {
            return Ok(false);
        }

        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(VIEWED_TABLE)?;
            table.insert(story_id, Utc::now().timestamp_millis())?;
        }
        write.commit()?;

        self.cache.write().insert(story_id.to_string());
        Ok(true)
    }

    pub fn contains(&self, story_id: &str) -> bool {
        self.cache.read().contains(story_id)
    }

    /// A copy of the full id set, for grouping.
    pub fn snapshot(&self) -> HashSet<String> {
        self.cache.read().clone()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
