//! Instagram platform implementation
//!
//! Publishing is a two-phase Graph API protocol: create a media
//! container, wait for server-side processing to finish, then publish
//! the container. The wait is a bounded poll with a fixed delay; a
//! container stuck in processing past the attempt ceiling is a hard
//! timeout, not a retry-forever loop.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{Publisher, ResolvedTarget};
use crate::types::{Platform, Post};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 10;

/// Instagram platform client
pub struct InstagramPublisher {
    client: Client,
    api_base: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

/// Processing state reported for a media container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    Error(String),
}

#[derive(Debug, Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    instagram_business_account: Option<LinkedAccount>,
}

#[derive(Debug, Deserialize)]
struct LinkedAccount {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: Option<String>,
}

impl InstagramPublisher {
    pub fn new(api_base: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        })
    }

    pub fn from_config(config: &InstagramConfig) -> Result<Self> {
        Self::new(config.api_base.clone())
    }

    /// Override the poll cadence (tests use a zero interval)
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    async fn create_container(
        &self,
        access_token: &str,
        business_account: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String> {
        let url = format!("{}/{}/media", self.api_base, business_account);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("image_url", image_url),
                ("caption", caption),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, "create container"))?;

        let created: CreatedObject = decode_graph_response(response, "create container", |msg| {
            PlatformError::ContainerCreate(format!("Instagram API Error (Create): {}", msg))
        })
        .await?;

        Ok(created.id)
    }

    async fn fetch_container_status(
        &self,
        access_token: &str,
        creation_id: &str,
    ) -> Result<ContainerStatus> {
        let url = format!("{}/{}", self.api_base, creation_id);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "status_code"), ("access_token", access_token)])
            .send()
            .await
            .map_err(|e| map_transport_error(e, "poll container status"))?;

        let status: StatusResponse =
            decode_graph_response(response, "poll container status", |msg| {
                PlatformError::MediaProcessing(format!("Instagram API Error (Status): {}", msg))
            })
            .await?;

        Ok(match status.status_code.as_deref() {
            Some("FINISHED") => ContainerStatus::Finished,
            Some("ERROR") => {
                ContainerStatus::Error("Instagram failed to process the image".to_string())
            }
            _ => ContainerStatus::InProgress,
        })
    }

    async fn publish_container(
        &self,
        access_token: &str,
        business_account: &str,
        creation_id: &str,
    ) -> Result<String> {
        let url = format!("{}/{}/media_publish", self.api_base, business_account);
        let response = self
            .client
            .post(&url)
            .query(&[("creation_id", creation_id), ("access_token", access_token)])
            .send()
            .await
            .map_err(|e| map_transport_error(e, "publish container"))?;

        let published: CreatedObject =
            decode_graph_response(response, "publish container", |msg| {
                PlatformError::Publish(format!("Instagram API Error (Publish): {}", msg))
            })
            .await?;

        Ok(published.id)
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn validate(&self, post: &Post) -> Result<()> {
        // The Graph API cannot create a standard feed post without media
        if post.image_url.is_none() {
            return Err(PlatformError::Validation(
                "An image is required for Instagram posts".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn resolve_target(&self, access_token: &str) -> Result<ResolvedTarget> {
        let url = format!("{}/me/accounts", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "instagram_business_account"),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, "list pages"))?;

        let pages: PageList = decode_graph_response(response, "list pages", |msg| {
            PlatformError::Network(format!("Instagram API Error (Pages): {}", msg))
        })
        .await?;

        let business_account = pick_business_account(&pages)?;
        Ok(ResolvedTarget::Instagram { business_account })
    }

    async fn publish(
        &self,
        access_token: &str,
        target: &ResolvedTarget,
        post: &Post,
    ) -> Result<String> {
        let ResolvedTarget::Instagram { business_account } = target else {
            return Err(PlatformError::Publish(
                "Instagram publisher invoked with a non-Instagram target".to_string(),
            )
            .into());
        };

        self.validate(post)?;
        let image_url = post.image_url.as_deref().unwrap_or_default();

        let creation_id = self
            .create_container(access_token, business_account, image_url, &post.content)
            .await?;

        await_container_ready(self.max_poll_attempts, self.poll_interval, || {
            self.fetch_container_status(access_token, &creation_id)
        })
        .await?;

        self.publish_container(access_token, business_account, &creation_id)
            .await
    }
}

/// Scan the page list for the first page with a linked Instagram
/// business account.
///
/// An unlinked account is the dominant real-world failure (personal
/// Instagram account, or Business account not connected to a Facebook
/// Page), so the message spells out the fix rather than reading like a
/// token problem.
fn pick_business_account(pages: &PageList) -> Result<String> {
    pages
        .data
        .iter()
        .find_map(|p| p.instagram_business_account.as_ref())
        .map(|a| a.id.clone())
        .ok_or_else(|| {
            PlatformError::NoLinkedInstagramAccount(
                "none of the linked Facebook Pages has an Instagram business account. Convert the Instagram account to a Business/Creator account and link it to a Facebook Page".to_string(),
            )
            .into()
        })
}

/// Drive the bounded container poll loop.
///
/// Waits `delay` before each status check, up to `max_attempts` checks.
/// `ERROR` fails immediately; exhausting the ceiling without `FINISHED`
/// is `MediaProcessingTimeout`. The status source is a closure so tests
/// can feed simulated sequences without real time passing.
pub(crate) async fn await_container_ready<F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut fetch_status: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ContainerStatus>>,
{
    for _ in 0..max_attempts {
        tokio::time::sleep(delay).await;
        match fetch_status().await? {
            ContainerStatus::Finished => return Ok(()),
            ContainerStatus::Error(msg) => {
                return Err(PlatformError::MediaProcessing(msg).into());
            }
            ContainerStatus::InProgress => {}
        }
    }

    Err(PlatformError::MediaProcessingTimeout(format!(
        "container did not finish within {} attempts",
        max_attempts
    ))
    .into())
}

/// Decode a Graph API response, mapping failures through the
/// caller-supplied constructor so each protocol step keeps its own
/// error kind while carrying the platform's message
async fn decode_graph_response<T, E>(
    response: reqwest::Response,
    context: &str,
    on_platform_error: E,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    E: FnOnce(String) -> PlatformError,
{
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(e, context))?;

    if !status.is_success() {
        let message = graph_error_message(&body);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(
                format!(
                    "Instagram rejected the access token (HTTP {}, {}): {}. Re-link the Instagram integration.",
                    status.as_u16(),
                    context,
                    message
                ),
            ),
            StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(format!(
                "Instagram rate limit hit ({}): {}. Try again later.",
                context, message
            )),
            _ => on_platform_error(message),
        }
        .into());
    }

    serde_json::from_slice(&body).map_err(|e| {
        PlatformError::Network(format!("Unexpected Graph response ({}): {}", context, e)).into()
    })
}

/// Graph error bodies look like {"error": {"message": "..."}}
fn graph_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return message.to_string();
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}

fn map_transport_error(error: reqwest::Error, context: &str) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Network(format!(
            "Instagram request timed out ({}): {}",
            context, error
        ))
    } else {
        PlatformError::Network(format!("Instagram request failed ({}): {}", context, error))
    }
}
