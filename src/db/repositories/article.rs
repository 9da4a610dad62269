//! Article repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Article, ArticleFilter, ArticleStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const ARTICLE_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.title, p.slug, p.excerpt, p.content, p.content_html,
           p.cover_image, p.status, p.views, p.published_at, p.created_at, p.updated_at,
           u.name AS author_name
    FROM articles p
    JOIN users u ON u.id = p.author_id
"#;

const ARTICLE_FILTER: &str =
    "(? IS NULL OR p.status = ?) AND (? IS NULL OR p.title LIKE ? OR p.content LIKE ?)";

/// Persistence for help articles
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article and return it with its new id
    async fn create(&self, article: &Article) -> Result<Article>;

    /// Get an article by id
    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Get an article by its URL slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Whether `slug` is taken by an article other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Persist every mutable column of `article`
    async fn update(&self, article: &Article) -> Result<Article>;

    /// Delete an article
    async fn delete(&self, id: i64) -> Result<()>;

    /// Newest first: published date, then creation date
    async fn list(&self, filter: &ArticleFilter, params: &ListParams) -> Result<(Vec<Article>, i64)>;

    /// Count articles matching `filter`
    async fn count(&self, filter: &ArticleFilter) -> Result<i64>;

    /// Bump the view counter by one
    async fn increment_views(&self, id: i64) -> Result<()>;
}

/// SQLx-backed articles for SQLite and MySQL.
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    /// Create a repository over the shared pool
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Boxed form handed to services
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_article_sqlite(self.pool.sqlite()?, article).await,
            DatabaseDriver::Mysql => create_article_mysql(self.pool.mysql()?, article).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_article_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_article_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_article_by_slug_sqlite(self.pool.sqlite()?, slug).await,
            DatabaseDriver::Mysql => get_article_by_slug_mysql(self.pool.mysql()?, slug).await,
        }
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                article_slug_exists_sqlite(self.pool.sqlite()?, slug, exclude_id).await
            }
            DatabaseDriver::Mysql => {
                article_slug_exists_mysql(self.pool.mysql()?, slug, exclude_id).await
            }
        }
    }

    async fn update(&self, article: &Article) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_article_sqlite(self.pool.sqlite()?, article).await,
            DatabaseDriver::Mysql => update_article_mysql(self.pool.mysql()?, article).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_article_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_article_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, filter: &ArticleFilter, params: &ListParams) -> Result<(Vec<Article>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_articles_sqlite(self.pool.sqlite()?, filter, params).await
            }
            DatabaseDriver::Mysql => list_articles_mysql(self.pool.mysql()?, filter, params).await,
        }
    }

    async fn count(&self, filter: &ArticleFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_articles_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Mysql => count_articles_mysql(self.pool.mysql()?, filter).await,
        }
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => increment_article_views_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => increment_article_views_mysql(self.pool.mysql()?, id).await,
        }
    }
}

fn filter_binds(filter: &ArticleFilter) -> (Option<String>, Option<String>) {
    let status = filter.status.map(|s| s.to_string());
    let pattern = filter
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| format!("%{}%", k));
    (status, pattern)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<Article> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO articles (author_id, title, slug, excerpt, content, content_html, cover_image,
                              status, views, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(article.author_id)
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.excerpt)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.cover_image)
    .bind(article.status.as_str())
    .bind(article.published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    get_article_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Article not found after insert"))
}

async fn get_article_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Article>> {
    let row = sqlx::query(&format!("{} WHERE p.id = ?", ARTICLE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by ID")?;

    row.as_ref().map(row_to_article_sqlite).transpose()
}

async fn get_article_by_slug_sqlite(pool: &SqlitePool, slug: &str) -> Result<Option<Article>> {
    let row = sqlx::query(&format!("{} WHERE p.slug = ?", ARTICLE_SELECT))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by slug")?;

    row.as_ref().map(row_to_article_sqlite).transpose()
}

async fn article_slug_exists_sqlite(
    pool: &SqlitePool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM articles WHERE slug = ? AND (? IS NULL OR id <> ?)",
    )
    .bind(slug)
    .bind(exclude_id)
    .bind(exclude_id)
    .fetch_one(pool)
    .await
    .context("Failed to check article slug")?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

async fn update_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<Article> {
    sqlx::query(
        r#"
        UPDATE articles
        SET title = ?, slug = ?, excerpt = ?, content = ?, content_html = ?, cover_image = ?,
            status = ?, published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.excerpt)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.cover_image)
    .bind(article.status.as_str())
    .bind(article.published_at)
    .bind(Utc::now())
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;

    get_article_by_id_sqlite(pool, article.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Article not found after update"))
}

async fn delete_article_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete article")?;

    Ok(())
}

async fn list_articles_sqlite(
    pool: &SqlitePool,
    filter: &ArticleFilter,
    params: &ListParams,
) -> Result<(Vec<Article>, i64)> {
    let (status, pattern) = filter_binds(filter);
    let sql = format!(
        "{} WHERE {} ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC LIMIT ? OFFSET ?",
        ARTICLE_SELECT, ARTICLE_FILTER
    );

    let rows = sqlx::query(&sql)
        .bind(&status)
        .bind(&status)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    let articles = rows
        .iter()
        .map(row_to_article_sqlite)
        .collect::<Result<Vec<_>>>()?;
    let total = count_articles_sqlite(pool, filter).await?;

    Ok((articles, total))
}

async fn count_articles_sqlite(pool: &SqlitePool, filter: &ArticleFilter) -> Result<i64> {
    let (status, pattern) = filter_binds(filter);
    let sql = format!("SELECT COUNT(*) AS count FROM articles p WHERE {}", ARTICLE_FILTER);

    let row = sqlx::query(&sql)
        .bind(&status)
        .bind(&status)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?;

    Ok(row.get("count"))
}

async fn increment_article_views_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE articles SET views = views + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to increment article views")?;

    Ok(())
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status: String = row.get("status");

    Ok(Article {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        cover_image: row.get("cover_image"),
        status: ArticleStatus::from_str(&status)?,
        views: row.get("views"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        author_name: row.get("author_name"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_article_mysql(pool: &MySqlPool, article: &Article) -> Result<Article> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO articles (author_id, title, slug, excerpt, content, content_html, cover_image,
                              status, views, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(article.author_id)
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.excerpt)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.cover_image)
    .bind(article.status.as_str())
    .bind(article.published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    get_article_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Article not found after insert"))
}

async fn get_article_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Article>> {
    let row = sqlx::query(&format!("{} WHERE p.id = ?", ARTICLE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by ID")?;

    row.as_ref().map(row_to_article_mysql).transpose()
}

async fn get_article_by_slug_mysql(pool: &MySqlPool, slug: &str) -> Result<Option<Article>> {
    let row = sqlx::query(&format!("{} WHERE p.slug = ?", ARTICLE_SELECT))
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by slug")?;

    row.as_ref().map(row_to_article_mysql).transpose()
}

async fn article_slug_exists_mysql(
    pool: &MySqlPool,
    slug: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM articles WHERE slug = ? AND (? IS NULL OR id <> ?)",
    )
    .bind(slug)
    .bind(exclude_id)
    .bind(exclude_id)
    .fetch_one(pool)
    .await
    .context("Failed to check article slug")?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

async fn update_article_mysql(pool: &MySqlPool, article: &Article) -> Result<Article> {
    sqlx::query(
        r#"
        UPDATE articles
        SET title = ?, slug = ?, excerpt = ?, content = ?, content_html = ?, cover_image = ?,
            status = ?, published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.excerpt)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.cover_image)
    .bind(article.status.as_str())
    .bind(article.published_at)
    .bind(Utc::now())
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;

    get_article_by_id_mysql(pool, article.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Article not found after update"))
}

async fn delete_article_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete article")?;

    Ok(())
}

async fn list_articles_mysql(
    pool: &MySqlPool,
    filter: &ArticleFilter,
    params: &ListParams,
) -> Result<(Vec<Article>, i64)> {
    let (status, pattern) = filter_binds(filter);
    let sql = format!(
        "{} WHERE {} ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC LIMIT ? OFFSET ?",
        ARTICLE_SELECT, ARTICLE_FILTER
    );

    let rows = sqlx::query(&sql)
        .bind(&status)
        .bind(&status)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    let articles = rows
        .iter()
        .map(row_to_article_mysql)
        .collect::<Result<Vec<_>>>()?;
    let total = count_articles_mysql(pool, filter).await?;

    Ok((articles, total))
}

async fn count_articles_mysql(pool: &MySqlPool, filter: &ArticleFilter) -> Result<i64> {
    let (status, pattern) = filter_binds(filter);
    let sql = format!("SELECT COUNT(*) AS count FROM articles p WHERE {}", ARTICLE_FILTER);

    let row = sqlx::query(&sql)
        .bind(&status)
        .bind(&status)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?;

    Ok(row.get("count"))
}

async fn increment_article_views_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE articles SET views = views + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to increment article views")?;

    Ok(())
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let status: String = row.get("status");

    Ok(Article {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        cover_image: row.get("cover_image"),
        status: ArticleStatus::from_str(&status)?,
        views: row.get("views"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        author_name: row.get("author_name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};

    async fn setup() -> (SqlxArticleRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let admin = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "Admin".to_string(),
                "admin@jobs.test".to_string(),
                "hash".to_string(),
                UserRole::Admin,
            ))
            .await
            .unwrap();
        (SqlxArticleRepository::new(pool), admin.id)
    }

    fn article(author_id: i64, title: &str, slug: &str, status: ArticleStatus) -> Article {
        let now = Utc::now();
        Article {
            id: 0,
            author_id,
            title: title.to_string(),
            slug: slug.to_string(),
            excerpt: None,
            content: format!("# {}", title),
            content_html: format!("<h1>{}</h1>", title),
            cover_image: None,
            status,
            views: 0,
            published_at: (status == ArticleStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
            author_name: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_by_slug() {
        let (repo, admin_id) = setup().await;
        let created = repo
            .create(&article(admin_id, "CV Tips", "cv-tips", ArticleStatus::Published))
            .await
            .unwrap();

        let found = repo.get_by_slug("cv-tips").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.author_name, "Admin");
        assert!(found.published_at.is_some());
    }

    #[tokio::test]
    async fn test_slug_exists_excludes_self() {
        let (repo, admin_id) = setup().await;
        let created = repo
            .create(&article(admin_id, "CV Tips", "cv-tips", ArticleStatus::Draft))
            .await
            .unwrap();

        assert!(repo.slug_exists("cv-tips", None).await.unwrap());
        assert!(!repo.slug_exists("cv-tips", Some(created.id)).await.unwrap());
        assert!(!repo.slug_exists("other", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_status_and_keyword() {
        let (repo, admin_id) = setup().await;
        repo.create(&article(admin_id, "CV Tips", "cv-tips", ArticleStatus::Published))
            .await
            .unwrap();
        repo.create(&article(admin_id, "Interview Tips", "interview", ArticleStatus::Draft))
            .await
            .unwrap();

        let params = ListParams::new(1, 10);
        let published = ArticleFilter {
            status: Some(ArticleStatus::Published),
            ..Default::default()
        };
        let (items, total) = repo.list(&published, &params).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].slug, "cv-tips");

        let keyword = ArticleFilter {
            keyword: Some("interview".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.count(&keyword).await.unwrap(), 1);
        assert_eq!(repo.count(&ArticleFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_views_delete() {
        let (repo, admin_id) = setup().await;
        let mut created = repo
            .create(&article(admin_id, "CV Tips", "cv-tips", ArticleStatus::Draft))
            .await
            .unwrap();

        repo.increment_views(created.id).await.unwrap();
        created.title = "Better CV Tips".to_string();
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.title, "Better CV Tips");
        assert_eq!(updated.views, 1);

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
