//! Multi-platform fan-out publishing
//!
//! One logical post goes out to every platform in its target set
//! independently: a failure on one platform never aborts the others,
//! and a post visible on at least one platform counts as published.
//! This module is the only place a post's status moves to `published`
//! or `failed`.

use std::time::Duration;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::platforms::Publisher;
use crate::types::{Platform, Post, PostStatus, PublishAttempt};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(45);

/// Result of one platform's attempt within a fan-out
#[derive(Debug, Clone)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub success: bool,
    /// Platform-specific id of the created content (if successful)
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate result of publishing one post
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub post_id: String,
    /// `Published` when at least one platform succeeded, else `Failed`
    pub status: PostStatus,
    pub outcomes: Vec<PlatformOutcome>,
}

impl PublishReport {
    /// Per-platform error messages, prefixed with the platform name
    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error
                    .as_ref()
                    .map(|e| format!("{}: {}", o.platform, e))
            })
            .collect()
    }

    /// External id of the first successful platform publish
    pub fn external_id(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| o.success)
            .and_then(|o| o.platform_post_id.as_deref())
    }
}

/// Fan-out publisher orchestrating the per-platform publishers
pub struct FanoutPublisher {
    publishers: Vec<Box<dyn Publisher>>,
    db: Database,
    attempt_timeout: Duration,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<Box<dyn Publisher>>, db: Database) -> Self {
        Self {
            publishers,
            db,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Override the per-platform deadline (each platform's
    /// resolve-then-publish runs under its own timeout)
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Publish a post to its target platforms and apply the resulting
    /// status to the stored post.
    ///
    /// `credentials` are the owner's linked credentials, passed
    /// explicitly per provider. A platform whose provider is not among
    /// them is recorded as `"<platform> integration missing"` and the
    /// fan-out moves on.
    ///
    /// # Errors
    ///
    /// Only storage failures surface as `Err`; every platform-level
    /// failure is captured in the report's outcomes.
    pub async fn publish(
        &self,
        post: &Post,
        credentials: &[crate::types::Credential],
    ) -> Result<PublishReport> {
        let mut outcomes = Vec::new();

        for platform in post.platform.expand() {
            let outcome = self.attempt_platform(platform, post, credentials).await;
            if let Some(error) = &outcome.error {
                warn!("Publish to {} failed for post {}: {}", platform, post.id, error);
            } else {
                info!(
                    "Published post {} to {}: {}",
                    post.id,
                    platform,
                    outcome.platform_post_id.as_deref().unwrap_or("-")
                );
            }
            self.record_attempt(&outcome, post).await;
            outcomes.push(outcome);
        }

        // Partial success counts as success: a post visible somewhere is
        // worth more to the owner than an all-or-nothing retraction.
        let status = if outcomes.iter().any(|o| o.success) {
            PostStatus::Published
        } else {
            PostStatus::Failed
        };

        let report = PublishReport {
            post_id: post.id.clone(),
            status: status.clone(),
            outcomes,
        };

        match status {
            PostStatus::Published => {
                self.db
                    .mark_published(
                        &post.id,
                        chrono::Utc::now().timestamp(),
                        report.external_id(),
                    )
                    .await?;
            }
            _ => {
                self.db.update_post_status(&post.id, PostStatus::Failed).await?;
            }
        }

        Ok(report)
    }

    async fn attempt_platform(
        &self,
        platform: Platform,
        post: &Post,
        credentials: &[crate::types::Credential],
    ) -> PlatformOutcome {
        let failure = |error: String| PlatformOutcome {
            platform,
            success: false,
            platform_post_id: None,
            error: Some(error),
        };

        let Some(publisher) = self.publishers.iter().find(|p| p.platform() == platform) else {
            return failure(format!("{} publishing is not configured", platform));
        };

        let Some(credential) = credentials
            .iter()
            .find(|c| c.provider == platform.credential_provider())
        else {
            return failure(format!("{} integration missing", platform));
        };

        let attempt = async {
            publisher.validate(post)?;
            // Resolve fresh every time; a persisted resource id can go
            // stale when the owning page or account changes
            let target = publisher.resolve_target(&credential.access_token).await?;
            publisher
                .publish(&credential.access_token, &target, post)
                .await
        };

        match tokio::time::timeout(self.attempt_timeout, attempt).await {
            Ok(Ok(platform_post_id)) => PlatformOutcome {
                platform,
                success: true,
                platform_post_id: Some(platform_post_id),
                error: None,
            },
            Ok(Err(e)) => failure(e.to_string()),
            Err(_) => failure(format!(
                "publish timed out after {}s",
                self.attempt_timeout.as_secs()
            )),
        }
    }

    /// Audit-trail write; a failure here must not fail the publish
    async fn record_attempt(&self, outcome: &PlatformOutcome, post: &Post) {
        let attempt = PublishAttempt {
            id: None,
            post_id: post.id.clone(),
            platform: outcome.platform.as_str().to_string(),
            success: outcome.success,
            platform_post_id: outcome.platform_post_id.clone(),
            error_message: outcome.error.clone(),
            attempted_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self.db.record_attempt(&attempt).await {
            warn!(
                "Failed to record attempt for platform {}: {}",
                outcome.platform, e
            );
        }
    }
}

/// Create publisher instances for all platforms enabled in the
/// configuration.
///
/// # Errors
///
/// Returns an error if an enabled platform's HTTP client cannot be
/// constructed.
pub fn create_publishers(config: &crate::Config) -> Result<Vec<Box<dyn Publisher>>> {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();

    if let Some(google) = &config.google {
        if google.enabled {
            info!("Creating Google Business Profile publisher");
            publishers.push(Box::new(crate::platforms::gbp::GbpPublisher::from_config(
                google,
            )?));
        }
    }

    if let Some(instagram) = &config.instagram {
        if instagram.enabled {
            info!("Creating Instagram publisher");
            publishers.push(Box::new(
                crate::platforms::instagram::InstagramPublisher::from_config(instagram)?,
            ));
        }
    }

    if publishers.is_empty() {
        warn!("No platforms are enabled in configuration");
    } else {
        info!("Created {} publisher(s)", publishers.len());
    }

    Ok(publishers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platforms::mock::MockPublisher;
    use crate::types::{Credential, TargetPlatforms};
    use sqlx::sqlite::SqlitePool;

    async fn test_db() -> Database {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Database::from_pool(pool).await.unwrap()
    }

    fn credential(provider: &str) -> Credential {
        Credential {
            user_id: "u1".to_string(),
            provider: provider.to_string(),
            provider_account_id: None,
            access_token: format!("{}-token", provider),
            refresh_token: None,
            expires_at: None,
            updated_at: 0,
        }
    }

    async fn stored_post(db: &Database, platform: TargetPlatforms) -> Post {
        let post = Post::draft("u1".to_string(), "Open late Friday".to_string(), platform)
            .with_image("https://cdn.example.com/p.jpg".to_string());
        db.create_post(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_single_platform_success() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Instagram).await;

        let publisher = FanoutPublisher::new(
            vec![Box::new(MockPublisher::success_with_id(
                Platform::Instagram,
                "17890000",
            ))],
            db.clone(),
        );

        let report = publisher
            .publish(&post, &[credential("instagram")])
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Published);
        assert_eq!(report.external_id(), Some("17890000"));
        assert!(report.errors().is_empty());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.published_at.is_some());
        assert_eq!(stored.external_id.as_deref(), Some("17890000"));
    }

    #[tokio::test]
    async fn test_partial_success_is_success() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Both).await;

        let publisher = FanoutPublisher::new(
            vec![
                Box::new(MockPublisher::success_with_id(Platform::Instagram, "178")),
                Box::new(MockPublisher::publish_failure(
                    Platform::Gbp,
                    PlatformError::Publish("GBP request failed (HTTP 500)".to_string()),
                )),
            ],
            db.clone(),
        );

        let report = publisher
            .publish(&post, &[credential("instagram"), credential("google")])
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Published);
        assert_eq!(report.outcomes.len(), 2);

        // The GBP failure is preserved in the error list
        let errors = report.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("gbp:"));
        assert!(errors[0].contains("HTTP 500"));

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_total_failure() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Both).await;

        let publisher = FanoutPublisher::new(
            vec![
                Box::new(MockPublisher::success(Platform::Instagram)),
                Box::new(MockPublisher::success(Platform::Gbp)),
            ],
            db.clone(),
        );

        // Neither integration is linked
        let report = publisher.publish(&post, &[]).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        let errors = report.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("instagram integration missing")));
        assert!(errors.iter().any(|e| e.contains("gbp integration missing")));

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.published_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_integration_message() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Gbp).await;

        let publisher = FanoutPublisher::new(
            vec![Box::new(MockPublisher::success(Platform::Gbp))],
            db.clone(),
        );

        // An instagram credential exists but no google one
        let report = publisher
            .publish(&post, &[credential("instagram")])
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(
            report.outcomes[0].error.as_deref(),
            Some("gbp integration missing")
        );
        assert!(!report.outcomes.iter().any(|o| o.success));
    }

    #[tokio::test]
    async fn test_resolution_failure_is_captured_per_platform() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Instagram).await;

        let publisher = FanoutPublisher::new(
            vec![Box::new(MockPublisher::resolve_failure(
                Platform::Instagram,
                PlatformError::NoLinkedInstagramAccount("no linked page".to_string()),
            ))],
            db.clone(),
        );

        let report = publisher
            .publish(&post, &[credential("instagram")])
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert!(report.errors()[0].contains("no linked page"));
    }

    #[tokio::test]
    async fn test_attempts_are_recorded() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Both).await;

        let publisher = FanoutPublisher::new(
            vec![
                Box::new(MockPublisher::success_with_id(Platform::Instagram, "178")),
                Box::new(MockPublisher::publish_failure(
                    Platform::Gbp,
                    PlatformError::RateLimit("quota".to_string()),
                )),
            ],
            db.clone(),
        );

        publisher
            .publish(&post, &[credential("instagram"), credential("google")])
            .await
            .unwrap();

        let attempts = db.get_attempts(&post.id).await.unwrap();
        assert_eq!(attempts.len(), 2);

        let ig = attempts.iter().find(|a| a.platform == "instagram").unwrap();
        assert!(ig.success);
        assert_eq!(ig.platform_post_id.as_deref(), Some("178"));

        let gbp = attempts.iter().find(|a| a.platform == "gbp").unwrap();
        assert!(!gbp.success);
        assert!(gbp.error_message.as_ref().unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn test_attempt_deadline_enforced() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Gbp).await;

        let publisher = FanoutPublisher::new(
            vec![Box::new(MockPublisher::with_delay(
                Platform::Gbp,
                Duration::from_secs(5),
            ))],
            db.clone(),
        )
        .with_attempt_timeout(Duration::from_millis(50));

        let report = publisher
            .publish(&post, &[credential("google")])
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert!(report.errors()[0].contains("timed out"));
    }

    #[test]
    fn test_create_publishers_no_enabled_platforms() {
        let config = crate::Config {
            database: crate::config::DatabaseConfig {
                path: ":memory:".to_string(),
            },
            google: None,
            instagram: None,
            sweep: Default::default(),
        };

        let publishers = create_publishers(&config).unwrap();
        assert_eq!(publishers.len(), 0);
    }

    #[test]
    fn test_create_publishers_disabled_platforms_skipped() {
        let mut config = crate::Config::default_config();
        if let Some(google) = &mut config.google {
            google.enabled = false;
        }

        let publishers = create_publishers(&config).unwrap();
        assert_eq!(publishers.len(), 1);
        assert_eq!(publishers[0].platform(), Platform::Instagram);
    }

    #[tokio::test]
    async fn test_unconfigured_platform_distinct_from_missing_credential() {
        let db = test_db().await;
        let post = stored_post(&db, TargetPlatforms::Gbp).await;

        // No GBP publisher wired up at all
        let publisher = FanoutPublisher::new(Vec::new(), db.clone());

        let report = publisher
            .publish(&post, &[credential("google")])
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert!(report.errors()[0].contains("not configured"));
    }
}
