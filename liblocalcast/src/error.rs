//! Error types for Localcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LocalcastError>;

#[derive(Error, Debug)]
pub enum LocalcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LocalcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LocalcastError::InvalidInput(_) => 3,
            LocalcastError::Platform(PlatformError::Authentication(_)) => 2,
            LocalcastError::Platform(_) => 1,
            LocalcastError::Config(_) => 1,
            LocalcastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while resolving a provider resource or publishing to it.
///
/// Resolution errors (`NoAccountFound`, `NoLocationFound`,
/// `NoLinkedInstagramAccount`) are recoverable by fixing the upstream
/// account setup; `Authentication` means the stored token is stale or
/// under-scoped and the user must re-link the provider. The remaining
/// variants carry the platform's own error message, which is the primary
/// diagnostic signal surfaced to users.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("No Google Business Profile account found: {0}")]
    NoAccountFound(String),

    #[error("No location found: {0}")]
    NoLocationFound(String),

    #[error("No linked Instagram business account: {0}")]
    NoLinkedInstagramAccount(String),

    #[error("Media container creation failed: {0}")]
    ContainerCreate(String),

    #[error("Media processing failed: {0}")]
    MediaProcessing(String),

    #[error("Media processing timed out: {0}")]
    MediaProcessingTimeout(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Network error: {0}")]
    Network(String),
}
