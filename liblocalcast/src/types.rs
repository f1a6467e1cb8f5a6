//! Core types for Localcast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A publishing destination.
///
/// `Gbp` posts go through the Google Business Profile local-post API and
/// authenticate with the user's `google` credential; `Instagram` posts go
/// through the Meta Graph API with the `instagram` credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    Gbp,
    Instagram,
}

impl Platform {
    /// Lowercase platform identifier as stored and displayed
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gbp => "gbp",
            Self::Instagram => "instagram",
        }
    }

    /// Name of the OAuth provider whose credential this platform uses.
    ///
    /// GBP publishing rides on the Google OAuth link, so the two names
    /// intentionally differ for that platform.
    pub fn credential_provider(&self) -> &'static str {
        match self {
            Self::Gbp => "google",
            Self::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The platform set a post targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetPlatforms {
    Gbp,
    Instagram,
    Both,
}

impl TargetPlatforms {
    /// Expand into the concrete platforms to publish to
    pub fn expand(&self) -> Vec<Platform> {
        match self {
            Self::Gbp => vec![Platform::Gbp],
            Self::Instagram => vec![Platform::Instagram],
            Self::Both => vec![Platform::Instagram, Platform::Gbp],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gbp => "gbp",
            Self::Instagram => "instagram",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gbp" => Some(Self::Gbp),
            "instagram" => Some(Self::Instagram),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetPlatforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PostStatus {
    Draft,
    Scheduled,
    /// Claimed by a publish run; blocks a concurrent run from picking
    /// the same post up again.
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "scheduled" => Some(Self::Scheduled),
            "publishing" => Some(Self::Publishing),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A logical content item one user wants published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub platform: TargetPlatforms,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    /// Platform-returned id of the first successful publish
    /// (e.g. an Instagram media id)
    pub external_id: Option<String>,
    pub created_at: i64,
}

impl Post {
    /// Create a draft post
    pub fn draft(user_id: String, content: String, platform: TargetPlatforms) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            image_url: None,
            platform,
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
            external_id: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_image(mut self, image_url: String) -> Self {
        self.image_url = Some(image_url);
        self
    }

    /// Schedule the post for a future time.
    ///
    /// A `scheduled` post must always carry a non-past `scheduled_at`,
    /// so past times are rejected here rather than at sweep time.
    pub fn schedule(mut self, at: i64, now: i64) -> crate::Result<Self> {
        if at < now {
            return Err(crate::LocalcastError::InvalidInput(format!(
                "Scheduled time {} is in the past",
                at
            )));
        }
        self.scheduled_at = Some(at);
        self.status = PostStatus::Scheduled;
        Ok(self)
    }
}

/// One OAuth credential row per (user, provider)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    /// Provider name: "google" or "instagram"
    pub provider: String,
    /// Identity id captured at link time. May be the login identity
    /// rather than the business resource; publishing never addresses
    /// with it and resolves the real resource from the token instead.
    pub provider_account_id: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

/// Durable record of one platform attempt for one post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishAttempt {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}
