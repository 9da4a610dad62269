//! Article model
//!
//! Career-advice and news posts written by administrators. Content is stored
//! as Markdown together with its rendered HTML.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    /// URL-friendly identifier (unique)
    pub slug: String,
    pub excerpt: Option<String>,
    /// Markdown source
    pub content: String,
    pub content_html: String,
    pub cover_image: Option<String>,
    pub status: ArticleStatus,
    pub views: i64,
    /// Set on first publish and kept afterwards
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub author_name: String,
}

impl Article {
    pub fn is_published(&self) -> bool {
        self.status == ArticleStatus::Published
    }
}

string_enum! {
    pub enum ArticleStatus {
        Draft => "draft",
        Published => "published",
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        Self::Draft
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    /// Generated from the title when absent
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub status: ArticleStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub status: Option<ArticleStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub status: Option<ArticleStatus>,
    pub keyword: Option<String>,
}
