//! Projects showcased on a profile.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::error::FursatResult;
use crate::gateway::{decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::ProjectRecord;

/// Fields for a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// Partial project edit. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Clone)]
pub struct Projects {
    gateway: Arc<dyn Gateway>,
}

impl Projects {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// A user's projects, newest first.
    pub async fn list_projects(&self, user_id: &str) -> FursatResult<Vec<ProjectRecord>> {
        decode_rows(
            self.gateway
                .select(
                    tables::PROJECTS,
                    &[Filter::Eq("user_id", json!(user_id))],
                    Some(OrderBy::desc("created_at")),
                )
                .await?,
        )
    }

    /// Add a project to the viewer's profile.
    pub async fn add_project(&self, project: &NewProject) -> FursatResult<ProjectRecord> {
        let user = require_user(self.gateway.as_ref())?;
        let row = self
            .gateway
            .insert(
                tables::PROJECTS,
                json!({
                    "user_id": user.id,
                    "title": project.title.trim(),
                    "description": project.description.as_ref().map(|s| s.trim()),
                    "link": project.link.as_ref().map(|s| s.trim()),
                }),
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Edit a project.
    pub async fn update_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> FursatResult<ProjectRecord> {
        let row = self
            .gateway
            .update(
                tables::PROJECTS,
                &[Filter::Eq("id", json!(project_id))],
                serde_json::to_value(patch)?,
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Remove a project.
    pub async fn delete_project(&self, project_id: &str) -> FursatResult<()> {
        self.gateway
            .delete(tables::PROJECTS, &[Filter::Eq("id", json!(project_id))])
            .await
    }
}
