//! News articles: public reading surface plus editorial CRUD.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::{FursatError, FursatResult};
use crate::gateway::{decode_rows, require_user, tables, Filter, Gateway, OrderBy};
use crate::types::{AuthorProfile, NewsRecord, ProfileRecord};

/// Fields for a new article.
#[derive(Debug, Clone)]
pub struct NewNewsPost {
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub cover_image_url: Option<String>,
    pub published: bool,
}

/// Partial article edit. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

#[derive(Clone)]
pub struct News {
    gateway: Arc<dyn Gateway>,
}

impl News {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Published articles, newest first, optionally narrowed to a category.
    pub async fn published_news(&self, category: Option<&str>) -> FursatResult<Vec<NewsRecord>> {
        let mut filters = vec![Filter::Eq("published", json!(true))];
        if let Some(category) = category {
            filters.push(Filter::Eq("category", json!(category)));
        }
        decode_rows(
            self.gateway
                .select(
                    tables::NEWS_POSTS,
                    &filters,
                    Some(OrderBy::desc("published_at")),
                )
                .await?,
        )
    }

    /// One published article by slug, with its author summary resolved.
    pub async fn news_by_slug(
        &self,
        slug: &str,
    ) -> FursatResult<(NewsRecord, AuthorProfile)> {
        let rows = self
            .gateway
            .select(
                tables::NEWS_POSTS,
                &[
                    Filter::Eq("slug", json!(slug)),
                    Filter::Eq("published", json!(true)),
                ],
                None,
            )
            .await?;
        let record: NewsRecord = serde_json::from_value(
            rows.into_iter()
                .next()
                .ok_or_else(|| FursatError::RecordNotFound(format!("news {}", slug)))?,
        )?;

        let profiles = self
            .gateway
            .select(
                tables::PROFILES,
                &[Filter::Eq("id", json!(record.author_id))],
                None,
            )
            .await?;
        let author = profiles
            .into_iter()
            .next()
            .map(|row| serde_json::from_value::<ProfileRecord>(row))
            .transpose()?
            .map(|p| AuthorProfile::from(&p))
            .unwrap_or_else(|| AuthorProfile::anonymous(record.author_id.clone()));

        Ok((record, author))
    }

    /// Every article regardless of publication state, newest first.
    /// Editorial listing; visibility is enforced by the gateway's row-level
    /// security, not here.
    pub async fn all_news(&self) -> FursatResult<Vec<NewsRecord>> {
        decode_rows(
            self.gateway
                .select(tables::NEWS_POSTS, &[], Some(OrderBy::desc("created_at")))
                .await?,
        )
    }

    /// Create an article; `published_at` is stamped when it goes out
    /// published.
    pub async fn create_news(&self, article: &NewNewsPost) -> FursatResult<NewsRecord> {
        let user = require_user(self.gateway.as_ref())?;
        let published_at = article.published.then(Utc::now);

        debug!(slug = article.slug.as_str(), "creating news post");
        let row = self
            .gateway
            .insert(
                tables::NEWS_POSTS,
                json!({
                    "title": article.title,
                    "slug": article.slug,
                    "summary": article.summary,
                    "content": article.content,
                    "category": article.category,
                    "cover_image_url": article.cover_image_url,
                    "published": article.published,
                    "published_at": published_at,
                    "author_id": user.id,
                }),
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Edit an article; first transition to published stamps
    /// `published_at`.
    pub async fn update_news(&self, news_id: &str, patch: &NewsPatch) -> FursatResult<NewsRecord> {
        let mut fields = serde_json::to_value(patch)?;
        fields["updated_at"] = json!(Utc::now());
        if patch.published == Some(true) {
            fields["published_at"] = json!(Utc::now());
        }

        let row = self
            .gateway
            .update(
                tables::NEWS_POSTS,
                &[Filter::Eq("id", json!(news_id))],
                fields,
            )
            .await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Remove an article.
    pub async fn delete_news(&self, news_id: &str) -> FursatResult<()> {
        self.gateway
            .delete(tables::NEWS_POSTS, &[Filter::Eq("id", json!(news_id))])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn article(slug: &str, published: bool, category: Option<&str>) -> NewNewsPost {
        NewNewsPost {
            title: format!("Title {}", slug),
            slug: slug.to_string(),
            summary: "summary".to_string(),
            content: Some("body".to_string()),
            category: category.map(str::to_string),
            cover_image_url: None,
            published,
        }
    }

    #[tokio::test]
    async fn test_published_listing_excludes_drafts() {
        let gateway = Arc::new(MemoryGateway::new());
        let news = News::new(gateway.clone());
        gateway.sign_in("ed", "ed@campus.edu");

        news.create_news(&article("live", true, Some("Events")))
            .await
            .unwrap();
        news.create_news(&article("draft", false, None)).await.unwrap();

        let listed = news.published_news(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "live");
        assert!(listed[0].published_at.is_some());

        assert_eq!(news.all_news().await.unwrap().len(), 2);
        assert_eq!(
            news.published_news(Some("Events")).await.unwrap().len(),
            1
        );
        assert!(news.published_news(Some("Sports")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slug_lookup_ignores_drafts() {
        let gateway = Arc::new(MemoryGateway::new());
        let news = News::new(gateway.clone());
        gateway.sign_in("ed", "ed@campus.edu");

        let draft = news.create_news(&article("soon", false, None)).await.unwrap();
        assert!(news.news_by_slug("soon").await.is_err());

        let patch = NewsPatch {
            published: Some(true),
            ..Default::default()
        };
        news.update_news(&draft.id, &patch).await.unwrap();

        let (found, author) = news.news_by_slug("soon").await.unwrap();
        assert_eq!(found.id, draft.id);
        assert!(found.published_at.is_some());
        assert_eq!(author.id, "ed");
    }
}
