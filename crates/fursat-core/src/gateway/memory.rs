//! In-memory reference gateway.
//!
//! Implements the full [`Gateway`] contract against process-local state:
//! per-table row vectors, insert-time defaults, uniqueness constraints,
//! foreign-key cascades matching the production schema, post-commit change
//! broadcasts, a blob map, and a switchable signed-in user. Integration
//! tests drive the synchronization core against this gateway, including
//! multi-viewer scenarios via `sign_in` / `sign_out`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;
use ulid::Ulid;

use crate::error::{FursatError, FursatResult};

use super::{
    compare_values, tables, AuthUser, ChangeEvent, ChangeKind, Filter, Gateway, OrderBy,
    TableEvents,
};

/// Capacity for per-table change broadcast channels.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Composite uniqueness constraints, mirroring the production schema.
const UNIQUE_KEYS: &[(&str, &[&str])] = &[
    (tables::PROFILES, &["id"]),
    (tables::LIKES, &["user_id", "post_id"]),
    (tables::SAVES, &["user_id", "post_id"]),
    (tables::CIRCLE_MEMBERS, &["circle_id", "user_id"]),
    (tables::CONVERSATION_MEMBERS, &["conversation_id", "user_id"]),
    (tables::NEWS_POSTS, &["slug"]),
];

/// Foreign-key cascades: deleting a parent row removes child rows whose
/// `child_column` equals the parent's `id`.
const CASCADES: &[(&str, &[(&str, &str)])] = &[
    (tables::POSTS, &[(tables::LIKES, "post_id"), (tables::SAVES, "post_id")]),
    (
        tables::CONVERSATIONS,
        &[
            (tables::MESSAGES, "conversation_id"),
            (tables::CONVERSATION_MEMBERS, "conversation_id"),
        ],
    ),
    (tables::CIRCLES, &[(tables::CIRCLE_MEMBERS, "circle_id")]),
];

struct State {
    tables: HashMap<String, Vec<Value>>,
    blobs: HashMap<String, Bytes>,
    user: Option<AuthUser>,
    fail_blob_removals: bool,
}

/// In-memory [`Gateway`] implementation.
#[derive(Clone)]
pub struct MemoryGateway {
    state: Arc<RwLock<State>>,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                tables: HashMap::new(),
                blobs: HashMap::new(),
                user: None,
                fail_blob_removals: false,
            })),
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Act as the given identity for subsequent viewer-scoped operations.
    pub fn sign_in(&self, id: impl Into<String>, email: impl Into<String>) {
        self.state.write().user = Some(AuthUser {
            id: id.into(),
            email: email.into(),
        });
    }

    /// Drop the signed-in identity.
    pub fn sign_out(&self) {
        self.state.write().user = None;
    }

    /// Make subsequent blob removals fail, for exercising the best-effort
    /// delete paths.
    pub fn set_blob_removal_failure(&self, fail: bool) {
        self.state.write().fail_blob_removals = fail;
    }

    /// Whether a blob exists at `bucket/path`.
    pub fn blob_exists(&self, bucket: &str, path: &str) -> bool {
        self.state.read().blobs.contains_key(&blob_key(bucket, path))
    }

    /// Number of rows currently in `table`.
    pub fn table_len(&self, table: &str) -> usize {
        self.state
            .read()
            .tables
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn sender_for(&self, table: &str) -> broadcast::Sender<ChangeEvent> {
        let mut channels = self.channels.write();
        channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Deliver change events after the row mutation has committed.
    fn publish(&self, table: &str, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let sender = {
            let channels = self.channels.read();
            channels.get(table).cloned()
        };
        if let Some(sender) = sender {
            for event in events {
                // Send errors just mean nobody is subscribed.
                let _ = sender.send(event);
            }
        }
    }

    fn unique_violation(table: &str, existing: &[Value], row: &Value) -> Option<String> {
        let keys = UNIQUE_KEYS
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, keys)| *keys)?;
        let clash = existing.iter().any(|other| {
            keys.iter()
                .all(|key| !row[*key].is_null() && other[*key] == row[*key])
        });
        clash.then(|| format!("{}({})", table, keys.join(", ")))
    }
}

fn blob_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path)
}

fn sort_rows(rows: &mut [Value], order: OrderBy) {
    rows.sort_by(|a, b| {
        let va = a.get(order.column).cloned().unwrap_or(Value::Null);
        let vb = b.get(order.column).cloned().unwrap_or(Value::Null);
        let ordering = compare_values(&va, &vb).unwrap_or(std::cmp::Ordering::Equal);
        if order.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

fn merge_patch(row: &mut Value, patch: &Value) {
    if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<OrderBy>,
    ) -> FursatResult<Vec<Value>> {
        let state = self.state.read();
        let mut rows: Vec<Value> = state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        if let Some(order) = order {
            sort_rows(&mut rows, order);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> FursatResult<Value> {
        let mut row = row;
        if !row.is_object() {
            return Err(FursatError::Gateway(format!(
                "insert into {} requires an object row",
                table
            )));
        }

        let now = json!(Utc::now());
        if row.get("id").map(Value::is_null).unwrap_or(true) {
            row["id"] = json!(Ulid::new().to_string());
        }
        if row.get("created_at").map(Value::is_null).unwrap_or(true) {
            row["created_at"] = now.clone();
        }
        // Column default in the schema: a fresh conversation sorts by its
        // creation time until the first send bumps it.
        if table == tables::CONVERSATIONS
            && row.get("last_message_at").map(Value::is_null).unwrap_or(true)
        {
            row["last_message_at"] = row["created_at"].clone();
        }

        {
            let mut state = self.state.write();
            let rows = state.tables.entry(table.to_string()).or_default();
            if let Some(constraint) = Self::unique_violation(table, rows, &row) {
                return Err(FursatError::Conflict(constraint));
            }
            rows.push(row.clone());
        }

        debug!(table, "row inserted");
        self.publish(
            table,
            vec![ChangeEvent {
                kind: ChangeKind::Insert,
                row: row.clone(),
            }],
        );
        Ok(row)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> FursatResult<Value> {
        let mut updated = Vec::new();
        {
            let mut state = self.state.write();
            let rows = state.tables.entry(table.to_string()).or_default();
            for row in rows.iter_mut() {
                if filters.iter().all(|f| f.matches(row)) {
                    merge_patch(row, &patch);
                    updated.push(row.clone());
                }
            }
        }

        let first = updated
            .first()
            .cloned()
            .ok_or_else(|| FursatError::RecordNotFound(table.to_string()))?;

        debug!(table, count = updated.len(), "rows updated");
        self.publish(
            table,
            updated
                .into_iter()
                .map(|row| ChangeEvent {
                    kind: ChangeKind::Update,
                    row,
                })
                .collect(),
        );
        Ok(first)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> FursatResult<()> {
        // (table, removed rows), parents first then cascaded children.
        let mut removed: Vec<(String, Vec<Value>)> = Vec::new();
        {
            let mut state = self.state.write();
            let rows = state.tables.entry(table.to_string()).or_default();
            let (gone, kept): (Vec<Value>, Vec<Value>) = rows
                .drain(..)
                .partition(|row| filters.iter().all(|f| f.matches(row)));
            *rows = kept;

            let cascades = CASCADES
                .iter()
                .find(|(t, _)| *t == table)
                .map(|(_, children)| *children)
                .unwrap_or(&[]);
            let parent_ids: Vec<Value> =
                gone.iter().filter_map(|row| row.get("id").cloned()).collect();

            removed.push((table.to_string(), gone));

            for (child_table, child_column) in cascades {
                let child_rows = state.tables.entry(child_table.to_string()).or_default();
                let (gone, kept): (Vec<Value>, Vec<Value>) =
                    child_rows.drain(..).partition(|row| {
                        row.get(*child_column)
                            .map(|v| parent_ids.contains(v))
                            .unwrap_or(false)
                    });
                *child_rows = kept;
                removed.push((child_table.to_string(), gone));
            }
        }

        for (table, rows) in removed {
            if !rows.is_empty() {
                debug!(table = table.as_str(), count = rows.len(), "rows deleted");
            }
            self.publish(
                &table,
                rows.into_iter()
                    .map(|row| ChangeEvent {
                        kind: ChangeKind::Delete,
                        row,
                    })
                    .collect(),
            );
        }
        Ok(())
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> FursatResult<()> {
        self.state.write().blobs.insert(blob_key(bucket, path), bytes);
        debug!(bucket, path, "blob uploaded");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://blobs.fursat.app/{}/{}", bucket, path)
    }

    async fn remove_blobs(&self, bucket: &str, paths: &[String]) -> FursatResult<()> {
        let mut state = self.state.write();
        if state.fail_blob_removals {
            return Err(FursatError::Blob("blob removal unavailable".to_string()));
        }
        for path in paths {
            state.blobs.remove(&blob_key(bucket, path));
        }
        Ok(())
    }

    fn subscribe(&self, table: &str, filter: Option<Filter>) -> FursatResult<TableEvents> {
        let sender = self.sender_for(table);
        Ok(TableEvents::new(sender.subscribe(), filter))
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state.read().user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_id_and_created_at() {
        let gateway = MemoryGateway::new();
        let row = gateway
            .insert(tables::POSTS, json!({"user_id": "u1", "content": "hi"}))
            .await
            .unwrap();
        assert!(row["id"].is_string());
        assert!(row["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let gateway = MemoryGateway::new();
        for (content, circle) in [("a", Value::Null), ("b", json!("c1")), ("c", Value::Null)] {
            gateway
                .insert(
                    tables::POSTS,
                    json!({"user_id": "u1", "content": content, "circle_id": circle}),
                )
                .await
                .unwrap();
        }

        let global = gateway
            .select(
                tables::POSTS,
                &[Filter::IsNull("circle_id")],
                Some(OrderBy::desc("created_at")),
            )
            .await
            .unwrap();
        assert_eq!(global.len(), 2);

        let scoped = gateway
            .select(tables::POSTS, &[Filter::Eq("circle_id", json!("c1"))], None)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0]["content"], json!("b"));
    }

    #[tokio::test]
    async fn test_unique_constraint_reports_conflict() {
        let gateway = MemoryGateway::new();
        gateway
            .insert(
                tables::PROFILES,
                json!({"id": "u1", "email": "a@campus.edu"}),
            )
            .await
            .unwrap();
        let err = gateway
            .insert(
                tables::PROFILES,
                json!({"id": "u1", "email": "a@campus.edu"}),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .update(
                tables::POSTS,
                &[Filter::Eq("id", json!("missing"))],
                json!({"content": "x"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FursatError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_join_rows() {
        let gateway = MemoryGateway::new();
        let post = gateway
            .insert(tables::POSTS, json!({"user_id": "u1", "content": "hi"}))
            .await
            .unwrap();
        gateway
            .insert(
                tables::LIKES,
                json!({"user_id": "u2", "post_id": post["id"]}),
            )
            .await
            .unwrap();
        gateway
            .insert(
                tables::SAVES,
                json!({"user_id": "u2", "post_id": post["id"]}),
            )
            .await
            .unwrap();

        gateway
            .delete(tables::POSTS, &[Filter::Eq("id", post["id"].clone())])
            .await
            .unwrap();

        assert_eq!(gateway.table_len(tables::POSTS), 0);
        assert_eq!(gateway.table_len(tables::LIKES), 0);
        assert_eq!(gateway.table_len(tables::SAVES), 0);
    }

    #[tokio::test]
    async fn test_subscription_delivers_filtered_inserts() {
        let gateway = MemoryGateway::new();
        let mut events = gateway
            .subscribe(
                tables::MESSAGES,
                Some(Filter::Eq("conversation_id", json!("conv1"))),
            )
            .unwrap();

        gateway
            .insert(
                tables::MESSAGES,
                json!({"conversation_id": "other", "sender_id": "u1", "content": "x"}),
            )
            .await
            .unwrap();
        gateway
            .insert(
                tables::MESSAGES,
                json!({"conversation_id": "conv1", "sender_id": "u1", "content": "y"}),
            )
            .await
            .unwrap();

        let event = events.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.row["content"], json!("y"));
    }

    #[tokio::test]
    async fn test_blob_roundtrip_and_failure_injection() {
        let gateway = MemoryGateway::new();
        gateway
            .upload(buckets_post_images(), "posts/u1/a.jpg", Bytes::from_static(b"img"))
            .await
            .unwrap();
        assert!(gateway.blob_exists(buckets_post_images(), "posts/u1/a.jpg"));

        gateway.set_blob_removal_failure(true);
        let err = gateway
            .remove_blobs(buckets_post_images(), &["posts/u1/a.jpg".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, FursatError::Blob(_)));

        gateway.set_blob_removal_failure(false);
        gateway
            .remove_blobs(buckets_post_images(), &["posts/u1/a.jpg".to_string()])
            .await
            .unwrap();
        assert!(!gateway.blob_exists(buckets_post_images(), "posts/u1/a.jpg"));
    }

    fn buckets_post_images() -> &'static str {
        crate::gateway::buckets::POST_IMAGES
    }
}
