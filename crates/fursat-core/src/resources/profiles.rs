//! Profile accessor.
//!
//! Profile creation at signup can race a server-side trigger creating the
//! same row; the uniqueness conflict is recovered locally by updating the
//! existing row instead of failing the signup.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::FursatResult;
use crate::gateway::{require_user, tables, Filter, Gateway};
use crate::types::ProfileRecord;

/// Editable profile fields. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Profile operations against the gateway.
#[derive(Clone)]
pub struct Profiles {
    gateway: Arc<dyn Gateway>,
}

impl Profiles {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Look up a profile by id. A missing row is a normal `None`, not an
    /// error.
    pub async fn fetch_profile(&self, user_id: &str) -> FursatResult<Option<ProfileRecord>> {
        let rows = self
            .gateway
            .select(tables::PROFILES, &[Filter::Eq("id", json!(user_id))], None)
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Create the viewer's profile row at signup.
    ///
    /// Falls back to an update when the row already exists (created
    /// concurrently by a server-side trigger).
    pub async fn ensure_profile(&self, username: &str) -> FursatResult<ProfileRecord> {
        let user = require_user(self.gateway.as_ref())?;
        let username = username.trim();

        let inserted = self
            .gateway
            .insert(
                tables::PROFILES,
                json!({
                    "id": user.id,
                    "email": user.email,
                    "username": username,
                }),
            )
            .await;

        match inserted {
            Ok(row) => {
                debug!(user_id = user.id.as_str(), "profile created");
                Ok(serde_json::from_value(row)?)
            }
            Err(err) if err.is_conflict() => {
                info!(user_id = user.id.as_str(), "profile exists, updating username");
                let row = self
                    .gateway
                    .update(
                        tables::PROFILES,
                        &[Filter::Eq("id", json!(user.id))],
                        json!({ "username": username }),
                    )
                    .await?;
                Ok(serde_json::from_value(row)?)
            }
            Err(err) => Err(err),
        }
    }

    /// Apply a partial edit to the viewer's profile, stamping `updated_at`.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> FursatResult<ProfileRecord> {
        let user = require_user(self.gateway.as_ref())?;

        let mut fields = serde_json::to_value(patch)?;
        fields["updated_at"] = json!(Utc::now());

        let row = self
            .gateway
            .update(
                tables::PROFILES,
                &[Filter::Eq("id", json!(user.id))],
                fields,
            )
            .await?;
        debug!(user_id = user.id.as_str(), "profile updated");
        Ok(serde_json::from_value(row)?)
    }
}
