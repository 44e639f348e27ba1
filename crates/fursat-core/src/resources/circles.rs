//! Circle accessor: creation with owner auto-enrollment, listing with
//! member counts and viewer membership, and join/leave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::error::{FursatError, FursatResult};
use crate::gateway::{decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::{Circle, CircleMemberRecord, CircleRecord, MemberRole};

/// Circle operations against the gateway.
#[derive(Clone)]
pub struct Circles {
    gateway: Arc<dyn Gateway>,
}

impl Circles {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Create a circle and enroll the creator as admin.
    ///
    /// The circle insert is authoritative; a failed enrollment is logged
    /// and the circle returned anyway (the creator can join manually).
    pub async fn create_circle(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> FursatResult<CircleRecord> {
        let user = require_user(self.gateway.as_ref())?;

        debug!(name, "creating circle");
        let row = self
            .gateway
            .insert(
                tables::CIRCLES,
                json!({
                    "name": name,
                    "description": description,
                    "owner_id": user.id,
                }),
            )
            .await?;
        let circle: CircleRecord = serde_json::from_value(row)?;

        if let Err(err) = self
            .gateway
            .insert(
                tables::CIRCLE_MEMBERS,
                json!({
                    "circle_id": circle.id,
                    "user_id": user.id,
                    "role": MemberRole::Admin,
                }),
            )
            .await
        {
            warn!(circle_id = circle.id.as_str(), %err, "owner enrollment failed");
        }

        Ok(circle)
    }

    /// All circles with member counts and the viewer's membership flag.
    pub async fn list_circles(&self) -> FursatResult<Vec<Circle>> {
        let records: Vec<CircleRecord> = decode_rows(
            self.gateway
                .select(tables::CIRCLES, &[], Some(OrderBy::desc("created_at")))
                .await?,
        )?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let members: Vec<CircleMemberRecord> = decode_rows(
            self.gateway
                .select(tables::CIRCLE_MEMBERS, &[], None)
                .await?,
        )?;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for member in &members {
            *counts.entry(member.circle_id.as_str()).or_default() += 1;
        }

        let mine: HashSet<&str> = match self.gateway.current_user() {
            Some(user) => members
                .iter()
                .filter(|m| m.user_id == user.id)
                .map(|m| m.circle_id.as_str())
                .collect(),
            None => HashSet::new(),
        };

        Ok(records
            .into_iter()
            .map(|record| Circle {
                member_count: counts.get(record.id.as_str()).copied().unwrap_or(0),
                is_member: mine.contains(record.id.as_str()),
                id: record.id,
                name: record.name,
                description: record.description,
                owner_id: record.owner_id,
                cover_image_url: record.cover_image_url,
                created_at: record.created_at,
            })
            .collect())
    }

    /// One circle with its member count and the viewer's membership flag.
    pub async fn circle_details(&self, circle_id: &str) -> FursatResult<Circle> {
        let rows = self
            .gateway
            .select(tables::CIRCLES, &[Filter::Eq("id", json!(circle_id))], None)
            .await?;
        let record: CircleRecord = serde_json::from_value(
            rows.into_iter()
                .next()
                .ok_or_else(|| FursatError::RecordNotFound(format!("circle {}", circle_id)))?,
        )?;

        let members = self
            .gateway
            .select(
                tables::CIRCLE_MEMBERS,
                &[Filter::Eq("circle_id", json!(circle_id))],
                None,
            )
            .await?;

        let is_member = match self.gateway.current_user() {
            Some(user) => members
                .iter()
                .any(|m| m.get("user_id") == Some(&json!(user.id))),
            None => false,
        };

        Ok(Circle {
            member_count: members.len() as u64,
            is_member,
            id: record.id,
            name: record.name,
            description: record.description,
            owner_id: record.owner_id,
            cover_image_url: record.cover_image_url,
            created_at: record.created_at,
        })
    }

    /// Circles a user belongs to.
    pub async fn user_circles(&self, user_id: &str) -> FursatResult<Vec<CircleRecord>> {
        let memberships: Vec<CircleMemberRecord> = decode_rows(
            self.gateway
                .select(
                    tables::CIRCLE_MEMBERS,
                    &[Filter::Eq("user_id", json!(user_id))],
                    None,
                )
                .await?,
        )?;
        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let circle_ids: Vec<_> = memberships.iter().map(|m| json!(m.circle_id)).collect();
        decode_rows(
            self.gateway
                .select(tables::CIRCLES, &[Filter::In("id", circle_ids)], None)
                .await?,
        )
    }

    /// Join a circle as a regular member.
    pub async fn join_circle(&self, circle_id: &str) -> FursatResult<()> {
        let user = require_user(self.gateway.as_ref())?;
        self.gateway
            .insert(
                tables::CIRCLE_MEMBERS,
                json!({
                    "circle_id": circle_id,
                    "user_id": user.id,
                    "role": MemberRole::Member,
                }),
            )
            .await?;
        debug!(circle_id, "joined circle");
        Ok(())
    }

    /// Leave a circle by removing the viewer's membership row.
    pub async fn leave_circle(&self, circle_id: &str) -> FursatResult<()> {
        let user = require_user(self.gateway.as_ref())?;
        self.gateway
            .delete(
                tables::CIRCLE_MEMBERS,
                &[
                    Filter::Eq("circle_id", json!(circle_id)),
                    Filter::Eq("user_id", json!(user.id)),
                ],
            )
            .await?;
        debug!(circle_id, "left circle");
        Ok(())
    }
}
