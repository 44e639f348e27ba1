//! Remote Data Gateway capability interface
//!
//! Everything the synchronization core needs from the hosted backend fits
//! through this narrow seam: row-level queries and mutations on named
//! tables, blob upload/URL-resolution/removal, table change subscriptions,
//! and the current signed-in identity. Authentication flows, session
//! refresh, and row-level security are the gateway's own responsibility.
//!
//! The core never reimplements the backend; tests run against the
//! in-memory [`MemoryGateway`] which honors the same contract, including
//! foreign-key cascades and post-commit change notifications.

use std::cmp::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{FursatError, FursatResult};

mod memory;

pub use memory::MemoryGateway;

/// Table names the core operates on.
pub mod tables {
    pub const POSTS: &str = "posts";
    pub const LIKES: &str = "likes";
    pub const SAVES: &str = "saves";
    pub const STORIES: &str = "stories";
    pub const CIRCLES: &str = "circles";
    pub const CIRCLE_MEMBERS: &str = "circle_members";
    pub const CONVERSATIONS: &str = "conversations";
    pub const CONVERSATION_MEMBERS: &str = "conversation_members";
    pub const MESSAGES: &str = "messages";
    pub const PROFILES: &str = "profiles";
    pub const SKILLS: &str = "skills";
    pub const PROJECTS: &str = "projects";
    pub const NEWS_POSTS: &str = "news_posts";
}

/// Blob buckets the core uploads to.
pub mod buckets {
    pub const POST_IMAGES: &str = "post-images";
    pub const STORIES: &str = "stories";
}

/// The currently signed-in identity, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// A row-level predicate on a named column.
///
/// These are the only predicate forms the core issues; a gateway
/// implementation maps them onto whatever its query layer supports.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    Gt(&'static str, Value),
    Lt(&'static str, Value),
    In(&'static str, Vec<Value>),
    IsNull(&'static str),
}

impl Filter {
    /// Evaluate the predicate against a row (a JSON object).
    ///
    /// Missing columns are treated as null. Ordered comparisons understand
    /// numbers and RFC3339 timestamps; anything else falls back to string
    /// ordering.
    pub fn matches(&self, row: &Value) -> bool {
        let field = |column: &str| row.get(column).cloned().unwrap_or(Value::Null);
        match self {
            Filter::Eq(column, expected) => field(column) == *expected,
            Filter::Ne(column, expected) => field(column) != *expected,
            Filter::Gt(column, bound) => {
                matches!(compare_values(&field(column), bound), Some(Ordering::Greater))
            }
            Filter::Lt(column, bound) => {
                matches!(compare_values(&field(column), bound), Some(Ordering::Less))
            }
            Filter::In(column, allowed) => allowed.contains(&field(column)),
            Filter::IsNull(column) => field(column).is_null(),
        }
    }

    /// The column this predicate constrains.
    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(column, _)
            | Filter::Ne(column, _)
            | Filter::Gt(column, _)
            | Filter::Lt(column, _)
            | Filter::In(column, _)
            | Filter::IsNull(column) => column,
        }
    }
}

/// Compare two row values for ordered predicates and sorting.
///
/// Nulls compare less than everything so ordered scans never panic on
/// partially-populated rows.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Sort directive for `select`.
#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    pub column: &'static str,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: &'static str) -> Self {
        Self { column, ascending: true }
    }

    pub fn desc(column: &'static str) -> Self {
        Self { column, ascending: false }
    }
}

/// Kind of a row change delivered on a table subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change notification for one row on a watched table.
///
/// For deletes, `row` is the row as it was before removal.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: Value,
}

/// An open change-notification channel for one table (and optional
/// predicate). Dropping it closes the channel.
pub struct TableEvents {
    receiver: broadcast::Receiver<ChangeEvent>,
    filter: Option<Filter>,
}

impl TableEvents {
    pub(crate) fn new(receiver: broadcast::Receiver<ChangeEvent>, filter: Option<Filter>) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next matching change event.
    ///
    /// Returns `None` once the channel is closed. A lagged receiver skips
    /// ahead rather than erroring: hooks react to any event with a
    /// re-fetch, so dropped intermediate events are harmless.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(filter) = &self.filter {
                        if !filter.matches(&event.row) {
                            continue;
                        }
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "table event receiver lagged; continuing");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The backend capability surface the core consumes.
///
/// Note on toggles: like/save toggling is a client-side existence check
/// followed by an insert or delete, which is not atomic across devices.
/// A gateway wanting stronger guarantees can expose an atomic
/// upsert-toggle; the core's observable behavior does not depend on it.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch rows from `table` matching all `filters`, optionally sorted.
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<OrderBy>,
    ) -> FursatResult<Vec<Value>>;

    /// Insert a row, returning it with gateway-assigned defaults applied.
    async fn insert(&self, table: &str, row: Value) -> FursatResult<Value>;

    /// Patch all rows matching `filters`, returning the first updated row.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> FursatResult<Value>;

    /// Delete all rows matching `filters`, cascading per the schema.
    async fn delete(&self, table: &str, filters: &[Filter]) -> FursatResult<()>;

    /// Upload a blob to `bucket` at `path`.
    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> FursatResult<()>;

    /// Resolve the public URL for a blob path.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Remove blobs, best-effort per path.
    async fn remove_blobs(&self, bucket: &str, paths: &[String]) -> FursatResult<()>;

    /// Open a change-notification channel for `table`, optionally
    /// narrowed by a predicate evaluated against each changed row.
    fn subscribe(&self, table: &str, filter: Option<Filter>) -> FursatResult<TableEvents>;

    /// The currently signed-in identity, if any.
    fn current_user(&self) -> Option<AuthUser>;
}

/// Deserialize a fetched row into a typed record.
pub fn decode_row<T: DeserializeOwned>(row: Value) -> FursatResult<T> {
    serde_json::from_value(row).map_err(FursatError::from)
}

/// Deserialize a fetched row set into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> FursatResult<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}

/// Require a signed-in identity for a viewer-scoped operation.
pub fn require_user(gateway: &dyn Gateway) -> FursatResult<AuthUser> {
    gateway.current_user().ok_or(FursatError::NotAuthenticated)
}
