//! Article service
//!
//! Admin-authored career articles. Markdown is rendered on write, slugs are
//! derived from titles and kept unique, and the public listing goes through
//! the SWR cache under the `articles:` prefix.

use crate::cache::SwrCache;
use crate::db::repositories::ArticleRepository;
use crate::models::{
    Article, ArticleFilter, ArticleStatus, CreateArticleInput, ListParams, Metric, PagedResult,
    UpdateArticleInput, User,
};
use crate::services::analytics::AnalyticsService;
use crate::services::markdown::MarkdownRenderer;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

pub const CACHE_PREFIX: &str = "articles:";

const EXCERPT_LENGTH: usize = 200;
const MAX_TITLE_LENGTH: usize = 255;
const MAX_SLUG_ATTEMPTS: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Article slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    cache: SwrCache,
    renderer: MarkdownRenderer,
    analytics: Arc<AnalyticsService>,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        cache: SwrCache,
        renderer: MarkdownRenderer,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        Self {
            repo,
            cache,
            renderer,
            analytics,
        }
    }

    /// Published articles, newest first.
    pub async fn list_published(
        &self,
        keyword: Option<String>,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let keyword = keyword.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        let key = format!(
            "{}list:k={}|p={}|n={}",
            CACHE_PREFIX,
            keyword.as_deref().unwrap_or("").to_lowercase(),
            params.page,
            params.per_page
        );
        let filter = ArticleFilter {
            status: Some(ArticleStatus::Published),
            keyword,
        };
        let repo = self.repo.clone();
        let params = *params;

        let page = self
            .cache
            .get(&key, move || async move {
                let (items, total) = repo.list(&filter, &params).await?;
                Ok(PagedResult::new(items, total, &params))
            })
            .await?;
        Ok(page)
    }

    pub async fn list(
        &self,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn count(&self, filter: &ArticleFilter) -> Result<i64, ArticleServiceError> {
        Ok(self.repo.count(filter).await.context("Failed to count articles")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound)
    }

    /// Public read by slug; drafts are not found. Counts the view.
    pub async fn view_by_slug(&self, slug: &str) -> Result<Article, ArticleServiceError> {
        let mut article = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get article by slug")?
            .filter(|a| a.is_published())
            .ok_or(ArticleServiceError::NotFound)?;

        self.repo
            .increment_views(article.id)
            .await
            .context("Failed to count article view")?;
        article.views += 1;
        self.analytics.record(Metric::ArticleView).await;
        Ok(article)
    }

    pub async fn create(
        &self,
        author: &User,
        input: CreateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let title = input.title.trim().to_string();
        validate_title(&title)?;
        if input.content.trim().is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "Content cannot be empty".to_string(),
            ));
        }

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => {
                let slug = generate_slug(requested);
                self.ensure_slug_free(&slug, None).await?;
                slug
            }
            None => self.unique_slug(&title, None).await?,
        };

        let now = Utc::now();
        let excerpt = self.excerpt_for(input.excerpt, &input.content);
        let article = Article {
            id: 0,
            author_id: author.id,
            title,
            slug,
            excerpt,
            content_html: self.renderer.render(&input.content),
            content: input.content,
            cover_image: input.cover_image.filter(|c| !c.trim().is_empty()),
            status: input.status,
            views: 0,
            published_at: (input.status == ArticleStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
            author_name: String::new(),
        };

        let created = self
            .repo
            .create(&article)
            .await
            .context("Failed to create article")?;
        self.invalidate().await;
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let mut article = self.get_by_id(id).await?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            article.title = title;
        }
        if let Some(slug) = input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let slug = generate_slug(slug);
            if slug != article.slug {
                self.ensure_slug_free(&slug, Some(id)).await?;
                article.slug = slug;
            }
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(ArticleServiceError::ValidationError(
                    "Content cannot be empty".to_string(),
                ));
            }
            article.content_html = self.renderer.render(&content);
            article.content = content;
        }
        if let Some(excerpt) = input.excerpt {
            article.excerpt = self.excerpt_for(Some(excerpt), &article.content);
        }
        if let Some(cover) = input.cover_image {
            article.cover_image = Some(cover).filter(|c| !c.trim().is_empty());
        }
        if let Some(status) = input.status {
            article.status = status;
            if status == ArticleStatus::Published && article.published_at.is_none() {
                article.published_at = Some(Utc::now());
            }
        }
        article.updated_at = Utc::now();

        let updated = self
            .repo
            .update(&article)
            .await
            .context("Failed to update article")?;
        self.invalidate().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<Article, ArticleServiceError> {
        let article = self.get_by_id(id).await?;
        self.repo
            .delete(id)
            .await
            .context("Failed to delete article")?;
        self.invalidate().await;
        Ok(article)
    }

    pub fn render_markdown(&self, content: &str) -> String {
        self.renderer.render(content)
    }

    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.invalidate_prefix(CACHE_PREFIX).await {
            tracing::warn!("Failed to invalidate article cache: {}", e);
        }
    }

    fn excerpt_for(&self, excerpt: Option<String>, content: &str) -> Option<String> {
        match excerpt.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()) {
            Some(e) => Some(e),
            None => Some(self.renderer.excerpt(content, EXCERPT_LENGTH)).filter(|e| !e.is_empty()),
        }
    }

    async fn ensure_slug_free(
        &self,
        slug: &str,
        exclude_id: Option<i64>,
    ) -> Result<(), ArticleServiceError> {
        if slug.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "Slug must contain letters or digits".to_string(),
            ));
        }
        if self
            .repo
            .slug_exists(slug, exclude_id)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(ArticleServiceError::DuplicateSlug(slug.to_string()));
        }
        Ok(())
    }

    /// Slug for `title`, suffixed `-2`, `-3`, ... until unused.
    async fn unique_slug(
        &self,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<String, ArticleServiceError> {
        let mut base = generate_slug(title);
        if base.is_empty() {
            base = "article".to_string();
        }

        let mut candidate = base.clone();
        for n in 2..MAX_SLUG_ATTEMPTS {
            let taken = self
                .repo
                .slug_exists(&candidate, exclude_id)
                .await
                .context("Failed to check slug uniqueness")?;
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}-{}", base, n);
        }
        Err(ArticleServiceError::DuplicateSlug(base))
    }
}

fn validate_title(title: &str) -> Result<(), ArticleServiceError> {
    if title.is_empty() {
        return Err(ArticleServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ArticleServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

/// Lowercase, keep alphanumerics (including non-ASCII letters), collapse
/// everything else into single hyphens.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::db::repositories::{
        SqlxAnalyticsRepository, SqlxArticleRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use std::time::Duration;

    async fn setup() -> (ArticleService, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let admin = SqlxUserRepository::new(pool.clone())
            .create(&User::new("Editor".into(), "editor@a.test".into(), "h".into(), UserRole::Admin))
            .await
            .unwrap();

        let swr = SwrCache::new(
            Arc::new(Cache::Memory(MemoryCache::new())),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );
        let service = ArticleService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            swr,
            MarkdownRenderer::new(),
            Arc::new(AnalyticsService::new(SqlxAnalyticsRepository::boxed(pool))),
        );
        (service, admin)
    }

    fn input(title: &str, status: ArticleStatus) -> CreateArticleInput {
        CreateArticleInput {
            title: title.to_string(),
            slug: None,
            excerpt: None,
            content: "## Before the interview\n\nResearch the **company**.".to_string(),
            cover_image: None,
            status,
        }
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  CV Tips: 2026 Edition!  "), "cv-tips-2026-edition");
        assert_eq!(generate_slug("snake_case__title"), "snake-case-title");
        assert_eq!(generate_slug("Kerja Remote di Bali"), "kerja-remote-di-bali");
        assert_eq!(generate_slug("技术 Tech"), "技术-tech");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[tokio::test]
    async fn test_create_renders_and_derives_fields() {
        let (service, admin) = setup().await;
        let article = service
            .create(&admin, input("Interview Tips", ArticleStatus::Draft))
            .await
            .unwrap();

        assert_eq!(article.slug, "interview-tips");
        assert!(article.content_html.contains("<h2>Before the interview</h2>"));
        assert_eq!(
            article.excerpt.as_deref(),
            Some("Before the interview Research the company.")
        );
        assert!(article.published_at.is_none());
        assert_eq!(article.author_name, "Editor");
    }

    #[tokio::test]
    async fn test_slugs_are_made_unique() {
        let (service, admin) = setup().await;
        let a = service.create(&admin, input("Salary Guide", ArticleStatus::Draft)).await.unwrap();
        let b = service.create(&admin, input("Salary Guide", ArticleStatus::Draft)).await.unwrap();
        let c = service.create(&admin, input("Salary guide!", ArticleStatus::Draft)).await.unwrap();
        assert_eq!(a.slug, "salary-guide");
        assert_eq!(b.slug, "salary-guide-2");
        assert_eq!(c.slug, "salary-guide-3");

        let mut explicit = input("Other", ArticleStatus::Draft);
        explicit.slug = Some("salary-guide".into());
        assert!(matches!(
            service.create(&admin, explicit).await,
            Err(ArticleServiceError::DuplicateSlug(_))
        ));

        let symbols = service.create(&admin, input("???", ArticleStatus::Draft)).await.unwrap();
        assert_eq!(symbols.slug, "article");
    }

    #[tokio::test]
    async fn test_validation() {
        let (service, admin) = setup().await;
        assert!(matches!(
            service.create(&admin, input("  ", ArticleStatus::Draft)).await,
            Err(ArticleServiceError::ValidationError(_))
        ));

        let mut empty = input("Title", ArticleStatus::Draft);
        empty.content = "   ".into();
        assert!(matches!(
            service.create(&admin, empty).await,
            Err(ArticleServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_sets_published_at_once() {
        let (service, admin) = setup().await;
        let draft = service.create(&admin, input("Draft", ArticleStatus::Draft)).await.unwrap();

        let published = service
            .update(
                draft.id,
                UpdateArticleInput {
                    status: Some(ArticleStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let first = published.published_at.expect("published_at set");

        service
            .update(draft.id, UpdateArticleInput { status: Some(ArticleStatus::Draft), ..Default::default() })
            .await
            .unwrap();
        let again = service
            .update(draft.id, UpdateArticleInput { status: Some(ArticleStatus::Published), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(again.published_at, Some(first));
    }

    #[tokio::test]
    async fn test_public_reads() {
        let (service, admin) = setup().await;
        let draft = service.create(&admin, input("Hidden", ArticleStatus::Draft)).await.unwrap();
        let live = service.create(&admin, input("Visible", ArticleStatus::Published)).await.unwrap();

        assert!(matches!(
            service.view_by_slug(&draft.slug).await,
            Err(ArticleServiceError::NotFound)
        ));
        assert_eq!(service.view_by_slug(&live.slug).await.unwrap().views, 1);
        assert_eq!(service.view_by_slug(&live.slug).await.unwrap().views, 2);

        let page = service.list_published(None, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].slug, "visible");

        // Publishing through the service refreshes the cached listing
        service
            .update(draft.id, UpdateArticleInput { status: Some(ArticleStatus::Published), ..Default::default() })
            .await
            .unwrap();
        let page = service.list_published(None, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_update_content_and_delete() {
        let (service, admin) = setup().await;
        let article = service.create(&admin, input("Edit me", ArticleStatus::Draft)).await.unwrap();

        let updated = service
            .update(
                article.id,
                UpdateArticleInput {
                    title: Some("Edited".into()),
                    slug: Some("Edited Slug".into()),
                    content: Some("*new*".into()),
                    excerpt: Some("Custom".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "edited-slug");
        assert!(updated.content_html.contains("<em>new</em>"));
        assert_eq!(updated.excerpt.as_deref(), Some("Custom"));

        service.delete(article.id).await.unwrap();
        assert!(matches!(
            service.get_by_id(article.id).await,
            Err(ArticleServiceError::NotFound)
        ));
    }
}
