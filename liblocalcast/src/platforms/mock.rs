//! Mock publisher for testing
//!
//! A configurable publisher that simulates resolution and publish
//! outcomes without credentials or network access. Available outside
//! `cfg(test)` so integration tests can drive the orchestrator and
//! sweep with it.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{Publisher, ResolvedTarget};
use crate::types::{Platform, Post};

/// Configuration for mock publisher behavior
#[derive(Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Error to return from resolution, if any
    pub resolve_error: Option<PlatformError>,

    /// Error to return from publishing, if any
    pub publish_error: Option<PlatformError>,

    /// Platform post id returned on success
    pub post_id: String,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of times resolve_target has been called
    pub resolve_calls: Arc<Mutex<usize>>,

    /// Number of times publish has been called
    pub publish_calls: Arc<Mutex<usize>>,

    /// Content that was published (for verification)
    pub published_content: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            resolve_error: None,
            publish_error: None,
            post_id: format!("{}-mock-id", platform.as_str()),
            delay: Duration::from_millis(0),
            resolve_calls: Arc::new(Mutex::new(0)),
            publish_calls: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher for tests
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A publisher for which everything succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// A publisher returning a fixed id on success
    pub fn success_with_id(platform: Platform, post_id: &str) -> Self {
        let mut config = MockConfig::new(platform);
        config.post_id = post_id.to_string();
        Self::new(config)
    }

    /// A publisher whose resolution fails
    pub fn resolve_failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.resolve_error = Some(error);
        Self::new(config)
    }

    /// A publisher whose publish call fails
    pub fn publish_failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.publish_error = Some(error);
        Self::new(config)
    }

    /// A publisher that stalls on publish (for deadline tests)
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        let mut config = MockConfig::new(platform);
        config.delay = delay;
        Self::new(config)
    }

    pub fn resolve_calls(&self) -> usize {
        *self.config.resolve_calls.lock().unwrap()
    }

    pub fn publish_calls(&self) -> usize {
        *self.config.publish_calls.lock().unwrap()
    }

    pub fn published_content(&self) -> Vec<String> {
        self.config.published_content.lock().unwrap().clone()
    }

    /// Handles onto the shared counters, usable after the publisher has
    /// been boxed into an orchestrator
    pub fn counters(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<usize>>, Arc<Mutex<Vec<String>>>) {
        (
            self.config.resolve_calls.clone(),
            self.config.publish_calls.clone(),
            self.config.published_content.clone(),
        )
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn resolve_target(&self, _access_token: &str) -> Result<ResolvedTarget> {
        *self.config.resolve_calls.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.resolve_error {
            return Err(error.clone().into());
        }

        Ok(match self.config.platform {
            Platform::Gbp => ResolvedTarget::Gbp {
                account: "accounts/mock".to_string(),
                location: "locations/mock".to_string(),
            },
            Platform::Instagram => ResolvedTarget::Instagram {
                business_account: "mock-business".to_string(),
            },
        })
    }

    async fn publish(
        &self,
        _access_token: &str,
        _target: &ResolvedTarget,
        post: &Post,
    ) -> Result<String> {
        *self.config.publish_calls.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        self.config
            .published_content
            .lock()
            .unwrap()
            .push(post.content.clone());

        Ok(self.config.post_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetPlatforms;

    #[tokio::test]
    async fn test_mock_success_flow() {
        let publisher = MockPublisher::success_with_id(Platform::Instagram, "media-1");
        let post = Post::draft("u".into(), "hello".into(), TargetPlatforms::Instagram);

        let target = publisher.resolve_target("token").await.unwrap();
        assert_eq!(
            target,
            ResolvedTarget::Instagram {
                business_account: "mock-business".to_string()
            }
        );

        let id = publisher.publish("token", &target, &post).await.unwrap();
        assert_eq!(id, "media-1");
        assert_eq!(publisher.resolve_calls(), 1);
        assert_eq!(publisher.publish_calls(), 1);
        assert_eq!(publisher.published_content(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_resolve_failure() {
        let publisher = MockPublisher::resolve_failure(
            Platform::Gbp,
            PlatformError::NoAccountFound("empty".to_string()),
        );
        let result = publisher.resolve_target("token").await;
        assert!(result.is_err());
        assert_eq!(publisher.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_publish_failure() {
        let publisher = MockPublisher::publish_failure(
            Platform::Gbp,
            PlatformError::RateLimit("HTTP 429".to_string()),
        );
        let post = Post::draft("u".into(), "x".into(), TargetPlatforms::Gbp);
        let target = publisher.resolve_target("token").await.unwrap();

        let result = publisher.publish("token", &target, &post).await;
        assert!(result.is_err());
        assert!(publisher.published_content().is_empty());
    }
}
