//! Google Business Profile platform implementation
//!
//! Resolves the caller's account and location from the access token via
//! the business-information API, then creates a local post through the
//! v4 local-post endpoint. Local-post creation is synchronous; no
//! polling is involved.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GoogleConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{Publisher, ResolvedTarget};
use crate::types::{Platform, Post};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GBP platform client
pub struct GbpPublisher {
    client: Client,
    /// Business-information API base (accounts / locations listing)
    api_base: String,
    /// v4 API base for local-post creation
    posts_api_base: String,
    /// Optional preferred location resource name; first-of-list otherwise
    location_preference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountList {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LocationList {
    #[serde(default)]
    locations: Vec<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalPostBody {
    language_code: String,
    summary: String,
    topic_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media: Vec<LocalPostMedia>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalPostMedia {
    media_format: String,
    source_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalPostConfirmation {
    name: Option<String>,
    search_url: Option<String>,
}

impl GbpPublisher {
    pub fn new(api_base: String, posts_api_base: String, location_preference: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base,
            posts_api_base,
            location_preference,
        })
    }

    pub fn from_config(config: &GoogleConfig) -> Result<Self> {
        Self::new(
            config.api_base.clone(),
            config.posts_api_base.clone(),
            config.location.clone(),
        )
    }

    async fn fetch_accounts(&self, access_token: &str) -> Result<AccountList> {
        let url = format!("{}/accounts", self.api_base);
        self.get_json(&url, access_token, "list accounts").await
    }

    async fn fetch_locations(&self, access_token: &str, account: &str) -> Result<LocationList> {
        let url = format!("{}/{}/locations?readMask=name,title", self.api_base, account);
        self.get_json(&url, access_token, "list locations").await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
        context: &str,
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        if !status.is_success() {
            return Err(map_status_error(status, &body, context).into());
        }

        serde_json::from_slice(&body).map_err(|e| {
            PlatformError::Network(format!("Unexpected GBP response ({}): {}", context, e)).into()
        })
    }
}

#[async_trait]
impl Publisher for GbpPublisher {
    fn platform(&self) -> Platform {
        Platform::Gbp
    }

    fn validate(&self, post: &Post) -> Result<()> {
        if post.content.trim().is_empty() {
            return Err(PlatformError::Validation(
                "A summary text is required for Google posts".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn resolve_target(&self, access_token: &str) -> Result<ResolvedTarget> {
        let accounts = self.fetch_accounts(access_token).await?;
        let account = pick_account(&accounts)?;

        let locations = self.fetch_locations(access_token, &account).await?;
        let location = pick_location(&locations, self.location_preference.as_deref())?;

        Ok(ResolvedTarget::Gbp { account, location })
    }

    async fn publish(
        &self,
        access_token: &str,
        target: &ResolvedTarget,
        post: &Post,
    ) -> Result<String> {
        let ResolvedTarget::Gbp { account, location } = target else {
            return Err(PlatformError::Publish(
                "GBP publisher invoked with a non-GBP target".to_string(),
            )
            .into());
        };

        self.validate(post)?;

        let body = local_post_body(&post.content, post.image_url.as_deref());
        let url = format!("{}/{}/{}/localPosts", self.posts_api_base, account, location);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "create local post"))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, "create local post"))?;

        if !status.is_success() {
            return Err(map_status_error(status, &bytes, "create local post").into());
        }

        let confirmation: LocalPostConfirmation = serde_json::from_slice(&bytes).map_err(|e| {
            PlatformError::Network(format!("Unexpected GBP response (create local post): {}", e))
        })?;

        Ok(confirmation
            .search_url
            .or(confirmation.name)
            .unwrap_or_else(|| "CHECK_GBP_DASHBOARD".to_string()))
    }
}

/// First-of-list account selection: the system assumes single-business
/// ownership, so the first listed account is the one.
fn pick_account(accounts: &AccountList) -> Result<String> {
    accounts
        .accounts
        .first()
        .map(|a| a.name.clone())
        .ok_or_else(|| {
            PlatformError::NoAccountFound(
                "the account list for this token is empty. Link a Google account that manages a Business Profile".to_string(),
            )
            .into()
        })
}

/// Pick the publish location. A configured preference must match one of
/// the listed locations; without one the first location wins.
fn pick_location(locations: &LocationList, preference: Option<&str>) -> Result<String> {
    if let Some(wanted) = preference {
        return locations
            .locations
            .iter()
            .find(|l| l.name == wanted)
            .map(|l| l.name.clone())
            .ok_or_else(|| {
                PlatformError::NoLocationFound(format!(
                    "configured location '{}' is not listed for this account",
                    wanted
                ))
                .into()
            });
    }

    locations
        .locations
        .first()
        .map(|l| l.name.clone())
        .ok_or_else(|| {
            PlatformError::NoLocationFound(
                "no locations are listed for this Business Profile account".to_string(),
            )
            .into()
        })
}

fn local_post_body(content: &str, image_url: Option<&str>) -> LocalPostBody {
    LocalPostBody {
        language_code: "en".to_string(),
        summary: content.to_string(),
        topic_type: "STANDARD".to_string(),
        media: image_url
            .map(|url| {
                vec![LocalPostMedia {
                    media_format: "PHOTO".to_string(),
                    source_url: url.to_string(),
                }]
            })
            .unwrap_or_default(),
    }
}

fn map_transport_error(error: reqwest::Error, context: &str) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Network(format!("GBP request timed out ({}): {}", context, error))
    } else {
        PlatformError::Network(format!("GBP request failed ({}): {}", context, error))
    }
}

/// Map a non-2xx GBP response.
///
/// 401/403 means the stored token is stale or missing the business scope
/// and the user must re-link Google; 429 is quota exhaustion and must
/// read as "try again later", never as an auth problem.
fn map_status_error(status: StatusCode, body: &[u8], context: &str) -> PlatformError {
    let message = platform_error_message(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(format!(
            "Google rejected the access token (HTTP {}, {}): {}. Re-link the Google Business Profile integration.",
            status.as_u16(),
            context,
            message
        )),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(format!(
            "Google Business Profile quota exceeded ({}): {}. Try again later.",
            context, message
        )),
        _ => PlatformError::Publish(format!(
            "GBP request failed (HTTP {}, {}): {}",
            status.as_u16(),
            context,
            message
        )),
    }
}

/// Pull the human-readable message out of a structured Google error body,
/// falling back to the raw text
fn platform_error_message(body: &[u8]) -> String {
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
