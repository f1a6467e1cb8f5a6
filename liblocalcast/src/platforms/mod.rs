//! Platform abstraction and implementations
//!
//! Each publishing platform pairs a resolver (token → concrete
//! addressable resource) with a publish call. Resolution runs fresh on
//! every publish: the persisted `provider_account_id` captures the
//! login identity, not the business resource, and the page/account a
//! token controls can change between publishes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Platform, Post};

pub mod gbp;
pub mod instagram;

// Mock publisher is available for all builds to support integration tests
pub mod mock;

/// Provider-specific addressable resource, computed just-in-time from an
/// access token. Never cached across publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// GBP account and location resource names
    /// (e.g. "accounts/12345", "locations/67890")
    Gbp { account: String, location: String },
    /// Instagram business-account id behind a linked Facebook Page
    Instagram { business_account: String },
}

/// A publishing destination the fan-out orchestrator can drive.
///
/// Implementations take the provider credential's access token as an
/// explicit parameter on every call; there is no ambient session.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The platform this publisher serves
    fn platform(&self) -> Platform;

    /// Check platform-specific post requirements before any network call
    fn validate(&self, _post: &Post) -> Result<()> {
        Ok(())
    }

    /// Discover the resource this token publishes to.
    ///
    /// # Errors
    ///
    /// Returns a resolution error (`NoAccountFound`, `NoLocationFound`,
    /// `NoLinkedInstagramAccount`) when the token is valid but the
    /// account setup is incomplete, or `Authentication` when the token
    /// itself is rejected.
    async fn resolve_target(&self, access_token: &str) -> Result<ResolvedTarget>;

    /// Publish the post to the resolved target, returning the
    /// platform-specific id of the created content.
    async fn publish(
        &self,
        access_token: &str,
        target: &ResolvedTarget,
        post: &Post,
    ) -> Result<String>;
}
