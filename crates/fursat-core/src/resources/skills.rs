//! Skills listed on a profile.

use std::sync::Arc;

use serde_json::json;

use crate::error::FursatResult;
use crate::gateway::{decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::SkillRecord;

#[derive(Clone)]
pub struct Skills {
    gateway: Arc<dyn Gateway>,
}

impl Skills {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// A user's skills, oldest first.
    pub async fn list_skills(&self, user_id: &str) -> FursatResult<Vec<SkillRecord>> {
        decode_rows(
            self.gateway
                .select(
                    tables::SKILLS,
                    &[Filter::Eq("user_id", json!(user_id))],
                    Some(OrderBy::asc("created_at")),
                )
                .await?,
        )
    }

    /// Add a skill to the viewer's profile.
    pub async fn add_skill(&self, name: &str) -> FursatResult<SkillRecord> {
        let user = require_user(self.gateway.as_ref())?;
        let row = self
            .gateway
            .insert(
                tables::SKILLS,
                json!({ "user_id": user.id, "name": name.trim() }),
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Remove a skill.
    pub async fn delete_skill(&self, skill_id: &str) -> FursatResult<()> {
        self.gateway
            .delete(tables::SKILLS, &[Filter::Eq("id", json!(skill_id))])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test]
    async fn test_skill_lifecycle() {
        let gateway = Arc::new(MemoryGateway::new());
        let skills = Skills::new(gateway.clone());
        gateway.sign_in("u1", "ada@campus.edu");

        let skill = skills.add_skill("  welding ").await.unwrap();
        assert_eq!(skill.name, "welding");

        let listed = skills.list_skills("u1").await.unwrap();
        assert_eq!(listed.len(), 1);

        skills.delete_skill(&skill.id).await.unwrap();
        assert!(skills.list_skills("u1").await.unwrap().is_empty());
    }
}
