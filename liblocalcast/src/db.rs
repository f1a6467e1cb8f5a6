//! Database operations for Localcast

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::Result;
use crate::types::{Post, PostStatus, PublishAttempt, TargetPlatforms};

/// A post with all its recorded platform attempts
#[derive(Debug, Clone)]
pub struct PostWithAttempts {
    pub post: Post,
    pub attempts: Vec<PublishAttempt>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
        }

        // Forward slashes for the SQLite URL; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Create a database over an existing pool (tests use `sqlite::memory:`)
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new post
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, image_url, platform, status,
                               scheduled_at, published_at, external_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(post.platform.as_str())
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.external_id)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, image_url, platform, status,
                   scheduled_at, published_at, external_id, created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(row_to_post))
    }

    /// Get a post by ID, scoped to its owner.
    ///
    /// Interactive callers go through this so one user can never read or
    /// act on another user's posts; only the sweep uses the unscoped reads.
    pub async fn get_post_for_user(&self, post_id: &str, user_id: &str) -> Result<Option<Post>> {
        let post = self.get_post(post_id).await?;
        Ok(post.filter(|p| p.user_id == user_id))
    }

    /// List a user's posts, newest first
    pub async fn list_posts_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, image_url, platform, status,
                   scheduled_at, published_at, external_id, created_at
            FROM posts WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_post).collect())
    }

    /// All posts whose scheduled time has elapsed.
    ///
    /// Deliberately unscoped: the sweep runs with service-level access
    /// across every user's queue. Must not be reachable from any
    /// user-facing request path.
    pub async fn get_due_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, image_url, platform, status,
                   scheduled_at, published_at, external_id, created_at
            FROM posts
            WHERE status = 'scheduled' AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_post).collect())
    }

    /// Atomically claim a scheduled post for publishing.
    ///
    /// Returns `true` if this caller won the claim. A post already moved
    /// to `publishing` by a racing sweep or interactive publish loses
    /// the compare-and-swap and must be skipped.
    pub async fn claim_for_publishing(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET status = 'publishing'
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Release a claimed post back to the scheduled queue (used when
    /// work had to be abandoned before any platform call, e.g. the
    /// owner's credentials could not be read)
    pub async fn release_claim(&self, post_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts SET status = 'scheduled'
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Update post status
    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Transition a post to published, stamping `published_at` and the
    /// external id in the same statement
    pub async fn mark_published(
        &self,
        post_id: &str,
        published_at: i64,
        external_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts SET status = 'published', published_at = ?, external_id = ?
            WHERE id = ?
            "#,
        )
        .bind(published_at)
        .bind(external_id)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Record one platform attempt
    pub async fn record_attempt(&self, attempt: &PublishAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publish_attempts
                (post_id, platform, success, platform_post_id, error_message, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.post_id)
        .bind(&attempt.platform)
        .bind(if attempt.success { 1 } else { 0 })
        .bind(&attempt.platform_post_id)
        .bind(&attempt.error_message)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get all recorded attempts for a post, newest first
    pub async fn get_attempts(&self, post_id: &str) -> Result<Vec<PublishAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, success, platform_post_id, error_message, attempted_at
            FROM publish_attempts
            WHERE post_id = ?
            ORDER BY attempted_at DESC, id DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| PublishAttempt {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                success: r.get::<i64, _>("success") != 0,
                platform_post_id: r.get("platform_post_id"),
                error_message: r.get("error_message"),
                attempted_at: r.get("attempted_at"),
            })
            .collect())
    }

    /// Get a post together with its attempt history
    pub async fn get_post_with_attempts(&self, post_id: &str) -> Result<Option<PostWithAttempts>> {
        let Some(post) = self.get_post(post_id).await? else {
            return Ok(None);
        };
        let attempts = self.get_attempts(post_id).await?;
        Ok(Some(PostWithAttempts { post, attempts }))
    }
}

fn row_to_post(r: sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: r.get("id"),
        user_id: r.get("user_id"),
        content: r.get("content"),
        image_url: r.get("image_url"),
        platform: TargetPlatforms::parse(&r.get::<String, _>("platform"))
            .unwrap_or(TargetPlatforms::Both),
        status: PostStatus::parse(&r.get::<String, _>("status")).unwrap_or(PostStatus::Draft),
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        external_id: r.get("external_id"),
        created_at: r.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetPlatforms;

    async fn test_db() -> Database {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Database::from_pool(pool).await.unwrap()
    }

    fn scheduled_post(user: &str, at: i64) -> Post {
        let now = at - 3600;
        Post::draft(user.to_string(), "Test content".to_string(), TargetPlatforms::Gbp)
            .schedule(at, now)
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let db = test_db().await;
        let post = Post::draft("user-1".into(), "hello".into(), TargetPlatforms::Instagram)
            .with_image("https://cdn.example.com/a.jpg".into());

        db.create_post(&post).await.unwrap();

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "hello");
        assert_eq!(loaded.image_url.as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(loaded.platform, TargetPlatforms::Instagram);
        assert_eq!(loaded.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_get_post_for_user_scoping() {
        let db = test_db().await;
        let post = Post::draft("owner".into(), "mine".into(), TargetPlatforms::Gbp);
        db.create_post(&post).await.unwrap();

        assert!(db.get_post_for_user(&post.id, "owner").await.unwrap().is_some());
        assert!(db.get_post_for_user(&post.id, "intruder").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_posts_range_query() {
        let db = test_db().await;
        let now = chrono::Utc::now().timestamp();

        let due = scheduled_post("u1", now - 300);
        let future = scheduled_post("u2", now + 3600);
        let draft = Post::draft("u3".into(), "not scheduled".into(), TargetPlatforms::Gbp);

        db.create_post(&due).await.unwrap();
        db.create_post(&future).await.unwrap();
        db.create_post(&draft).await.unwrap();

        let found = db.get_due_posts(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_claim_for_publishing_single_winner() {
        let db = test_db().await;
        let now = chrono::Utc::now().timestamp();
        let post = scheduled_post("u1", now - 60);
        db.create_post(&post).await.unwrap();

        assert!(db.claim_for_publishing(&post.id).await.unwrap());
        // Second claimer loses the compare-and-swap
        assert!(!db.claim_for_publishing(&post.id).await.unwrap());

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Publishing);
    }

    #[tokio::test]
    async fn test_release_claim_restores_scheduled() {
        let db = test_db().await;
        let now = chrono::Utc::now().timestamp();
        let post = scheduled_post("u1", now - 60);
        db.create_post(&post).await.unwrap();

        assert!(db.claim_for_publishing(&post.id).await.unwrap());
        db.release_claim(&post.id).await.unwrap();

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Scheduled);
        // Claimable again
        assert!(db.claim_for_publishing(&post.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_published_sets_timestamp_and_external_id() {
        let db = test_db().await;
        let post = Post::draft("u1".into(), "x".into(), TargetPlatforms::Instagram);
        db.create_post(&post).await.unwrap();

        db.mark_published(&post.id, 1_700_000_000, Some("17890000000")).await.unwrap();

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Published);
        assert_eq!(loaded.published_at, Some(1_700_000_000));
        assert_eq!(loaded.external_id.as_deref(), Some("17890000000"));
    }

    #[tokio::test]
    async fn test_record_and_get_attempts() {
        let db = test_db().await;
        let post = Post::draft("u1".into(), "x".into(), TargetPlatforms::Both);
        db.create_post(&post).await.unwrap();

        db.record_attempt(&PublishAttempt {
            id: None,
            post_id: post.id.clone(),
            platform: "instagram".into(),
            success: true,
            platform_post_id: Some("178".into()),
            error_message: None,
            attempted_at: 100,
        })
        .await
        .unwrap();
        db.record_attempt(&PublishAttempt {
            id: None,
            post_id: post.id.clone(),
            platform: "gbp".into(),
            success: false,
            platform_post_id: None,
            error_message: Some("HTTP 429".into()),
            attempted_at: 101,
        })
        .await
        .unwrap();

        let attempts = db.get_attempts(&post.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].platform, "gbp");
        assert!(!attempts[0].success);
        assert_eq!(attempts[0].error_message.as_deref(), Some("HTTP 429"));
        assert_eq!(attempts[1].platform, "instagram");
        assert!(attempts[1].success);

        let with = db.get_post_with_attempts(&post.id).await.unwrap().unwrap();
        assert_eq!(with.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_list_posts_for_user() {
        let db = test_db().await;
        for i in 0..3 {
            let mut p = Post::draft("u1".into(), format!("post {}", i), TargetPlatforms::Gbp);
            p.created_at = 1000 + i;
            db.create_post(&p).await.unwrap();
        }
        db.create_post(&Post::draft("u2".into(), "other".into(), TargetPlatforms::Gbp))
            .await
            .unwrap();

        let posts = db.list_posts_for_user("u1", 10).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].content, "post 2");
    }
}
