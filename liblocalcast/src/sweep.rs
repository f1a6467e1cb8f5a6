//! Scheduled-post sweep
//!
//! One sweep finds every post whose scheduled time has elapsed and
//! pushes it through the fan-out publisher, one post at a time. Posts
//! are isolated from each other: an error while processing one is
//! recorded in the summary and the sweep moves on.
//!
//! The runner reads across all users' queues and credentials, so it is
//! only ever constructed inside the sweep daemon. Interactive request
//! paths must stay scoped to the calling user and never reach this type.

use tracing::{info, warn};

use crate::credentials::CredentialStore;
use crate::db::Database;
use crate::error::Result;
use crate::publisher::FanoutPublisher;
use crate::types::{Post, PostStatus};

/// Per-post log line of one sweep
#[derive(Debug, Clone)]
pub struct SweepLogEntry {
    pub post_id: String,
    pub status: PostStatus,
    pub errors: Vec<String>,
}

/// Result of one sweep cycle, suitable for operational logging
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub processed: usize,
    pub entries: Vec<SweepLogEntry>,
}

pub struct SweepRunner {
    db: Database,
    credentials: CredentialStore,
    publisher: FanoutPublisher,
}

impl SweepRunner {
    pub fn new(db: Database, credentials: CredentialStore, publisher: FanoutPublisher) -> Self {
        Self {
            db,
            credentials,
            publisher,
        }
    }

    /// Process every due scheduled post once.
    ///
    /// # Errors
    ///
    /// Only the initial due-post query can fail the cycle; the caller's
    /// next tick retries it. Everything after that is isolated per post.
    pub async fn run_once(&self) -> Result<SweepSummary> {
        let now = chrono::Utc::now().timestamp();
        let due = self.db.get_due_posts(now).await?;

        if due.is_empty() {
            return Ok(SweepSummary::default());
        }

        info!("Found {} post(s) due for publishing", due.len());

        let mut entries = Vec::with_capacity(due.len());
        for post in &due {
            entries.push(self.process_post(post).await);
        }

        Ok(SweepSummary {
            processed: entries.len(),
            entries,
        })
    }

    async fn process_post(&self, post: &Post) -> SweepLogEntry {
        info!("Processing post: {}", post.id);

        match self.try_publish(post).await {
            Ok(Some(report)) => SweepLogEntry {
                post_id: post.id.clone(),
                errors: report.errors(),
                status: report.status,
            },
            // Lost the claim: another publish run picked this post up
            Ok(None) => {
                info!("Post {} already claimed, skipping", post.id);
                SweepLogEntry {
                    post_id: post.id.clone(),
                    status: PostStatus::Publishing,
                    errors: Vec::new(),
                }
            }
            Err(e) => {
                warn!("Post {} could not be processed: {}", post.id, e);
                // Storage failed before any platform call; hand the post
                // back to the queue so the next cycle retries it
                if let Err(release_err) = self.db.release_claim(&post.id).await {
                    warn!("Failed to release claim on {}: {}", post.id, release_err);
                }
                SweepLogEntry {
                    post_id: post.id.clone(),
                    status: PostStatus::Scheduled,
                    errors: vec![e.to_string()],
                }
            }
        }
    }

    /// Claim and publish one due post. `Ok(None)` means the claim was
    /// lost to a concurrent run and the post must be skipped.
    async fn try_publish(&self, post: &Post) -> Result<Option<crate::publisher::PublishReport>> {
        if !self.db.claim_for_publishing(&post.id).await? {
            return Ok(None);
        }

        let credentials = self.credentials.for_user(&post.user_id).await?;
        let report = self.publisher.publish(post, &credentials).await?;
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platforms::mock::MockPublisher;
    use crate::types::{Credential, Platform, Post, TargetPlatforms};
    use sqlx::sqlite::SqlitePool;

    async fn test_db() -> Database {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Database::from_pool(pool).await.unwrap()
    }

    async fn link(store: &CredentialStore, user: &str, provider: &str) {
        store
            .upsert(&Credential {
                user_id: user.to_string(),
                provider: provider.to_string(),
                provider_account_id: None,
                access_token: format!("{}-token", provider),
                refresh_token: None,
                expires_at: None,
                updated_at: chrono::Utc::now().timestamp(),
            })
            .await
            .unwrap();
    }

    async fn due_post(db: &Database, user: &str, content: &str, platform: TargetPlatforms) -> Post {
        let now = chrono::Utc::now().timestamp();
        let post = Post::draft(user.to_string(), content.to_string(), platform)
            .with_image("https://cdn.example.com/a.jpg".to_string())
            .schedule(now - 300, now - 600)
            .unwrap();
        db.create_post(&post).await.unwrap();
        post
    }

    fn runner_with(db: &Database, publishers: Vec<Box<dyn crate::platforms::Publisher>>) -> SweepRunner {
        SweepRunner::new(
            db.clone(),
            CredentialStore::new(db.clone()),
            FanoutPublisher::new(publishers, db.clone()),
        )
    }

    #[tokio::test]
    async fn test_sweep_no_due_posts_is_noop() {
        let db = test_db().await;
        let runner = runner_with(&db, vec![Box::new(MockPublisher::success(Platform::Gbp))]);

        let summary = runner.run_once().await.unwrap();
        assert_eq!(summary.processed, 0);
        assert!(summary.entries.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_publishes_due_post() {
        let db = test_db().await;
        let store = CredentialStore::new(db.clone());
        link(&store, "u1", "instagram").await;

        let post = due_post(&db, "u1", "hello", TargetPlatforms::Instagram).await;
        let runner = runner_with(
            &db,
            vec![Box::new(MockPublisher::success_with_id(
                Platform::Instagram,
                "17890000",
            ))],
        );

        let summary = runner.run_once().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.entries[0].post_id, post.id);
        assert_eq!(summary.entries[0].status, PostStatus::Published);
        assert!(summary.entries[0].errors.is_empty());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.published_at.is_some());
        assert_eq!(stored.external_id.as_deref(), Some("17890000"));
    }

    #[tokio::test]
    async fn test_sweep_ignores_future_posts() {
        let db = test_db().await;
        let store = CredentialStore::new(db.clone());
        link(&store, "u1", "google").await;

        let now = chrono::Utc::now().timestamp();
        let future = Post::draft("u1".to_string(), "later".to_string(), TargetPlatforms::Gbp)
            .schedule(now + 3600, now)
            .unwrap();
        db.create_post(&future).await.unwrap();

        let runner = runner_with(&db, vec![Box::new(MockPublisher::success(Platform::Gbp))]);
        let summary = runner.run_once().await.unwrap();
        assert_eq!(summary.processed, 0);

        let stored = db.get_post(&future.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_sweep_isolates_post_failures() {
        let db = test_db().await;
        let store = CredentialStore::new(db.clone());
        link(&store, "ok", "google").await;

        // Three due posts; the middle one's owner never linked Google,
        // so its publish fails outright
        let first = due_post(&db, "ok", "first", TargetPlatforms::Gbp).await;
        let second = due_post(&db, "good", "second", TargetPlatforms::Gbp).await;
        let third = due_post(&db, "ok", "third", TargetPlatforms::Gbp).await;

        let runner = runner_with(&db, vec![Box::new(MockPublisher::success(Platform::Gbp))]);
        let summary = runner.run_once().await.unwrap();

        assert_eq!(summary.processed, 3);

        let by_id = |id: &str| summary.entries.iter().find(|e| e.post_id == id).unwrap();
        assert_eq!(by_id(&first.id).status, PostStatus::Published);
        assert_eq!(by_id(&second.id).status, PostStatus::Failed);
        assert!(by_id(&second.id).errors[0].contains("gbp integration missing"));
        assert_eq!(by_id(&third.id).status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_sweep_storage_error_releases_claim_and_continues() {
        let db = test_db().await;

        // Credentials live in a separate store whose pool is closed, so
        // every credential load fails with a storage error
        let broken_pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let broken_db = Database::from_pool(broken_pool.clone()).await.unwrap();
        broken_pool.close().await;

        let first = due_post(&db, "u1", "one", TargetPlatforms::Gbp).await;
        let second = due_post(&db, "u2", "two", TargetPlatforms::Gbp).await;

        let runner = SweepRunner::new(
            db.clone(),
            CredentialStore::new(broken_db),
            FanoutPublisher::new(
                vec![Box::new(MockPublisher::success(Platform::Gbp))],
                db.clone(),
            ),
        );

        let summary = runner.run_once().await.unwrap();

        // Both posts were attempted and reported; neither aborted the sweep
        assert_eq!(summary.processed, 2);
        for entry in &summary.entries {
            assert_eq!(entry.status, PostStatus::Scheduled);
            assert!(!entry.errors.is_empty());
        }

        // Claims were released so the next cycle retries
        for id in [&first.id, &second.id] {
            let stored = db.get_post(id).await.unwrap().unwrap();
            assert_eq!(stored.status, PostStatus::Scheduled);
        }
    }

    #[tokio::test]
    async fn test_sweep_skips_post_claimed_elsewhere() {
        let db = test_db().await;
        let store = CredentialStore::new(db.clone());
        link(&store, "u1", "google").await;

        let post = due_post(&db, "u1", "contested", TargetPlatforms::Gbp).await;

        // A concurrent interactive publish grabbed the claim between the
        // due query and processing
        assert!(db.claim_for_publishing(&post.id).await.unwrap());

        // The due query ran before the claim in this simulation, so feed
        // the post through process_post directly
        let runner = runner_with(&db, vec![Box::new(MockPublisher::success(Platform::Gbp))]);
        let entry = runner.process_post(&post).await;

        assert_eq!(entry.status, PostStatus::Publishing);
        assert!(entry.errors.is_empty());

        // The post was not published by the sweep
        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Publishing);
    }

    #[tokio::test]
    async fn test_end_to_end_scheduled_instagram_publish() {
        let db = test_db().await;
        let store = CredentialStore::new(db.clone());
        link(&store, "owner-1", "instagram").await;

        // Scheduled five minutes in the past, image set
        let now = chrono::Utc::now().timestamp();
        let post = Post::draft(
            "owner-1".to_string(),
            "Weekend special".to_string(),
            TargetPlatforms::Instagram,
        )
        .with_image("https://cdn.example.com/special.jpg".to_string())
        .schedule(now - 300, now - 400)
        .unwrap();
        db.create_post(&post).await.unwrap();

        let runner = runner_with(
            &db,
            vec![Box::new(MockPublisher::success_with_id(
                Platform::Instagram,
                "17895551234",
            ))],
        );

        let before = chrono::Utc::now().timestamp();
        let summary = runner.run_once().await.unwrap();
        let after = chrono::Utc::now().timestamp();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.entries[0].status, PostStatus::Published);

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert_eq!(stored.external_id.as_deref(), Some("17895551234"));
        let published_at = stored.published_at.unwrap();
        assert!(published_at >= before && published_at <= after);
    }
}
