//! local-creds - Manage linked provider credentials
//!
//! Stores and removes the OAuth tokens the publishing pipeline uses.
//! In production the dashboard's auth callback writes these rows; this
//! tool covers operations work and local setups.

use anyhow::Result;
use clap::{Parser, Subcommand};
use liblocalcast::{Config, Credential, CredentialStore, Database};
use std::io::Read;
use tracing::error;

const PROVIDERS: [&str; 2] = ["google", "instagram"];

#[derive(Parser)]
#[command(name = "local-creds")]
#[command(about = "Manage linked Google and Instagram credentials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Link a provider by storing its OAuth tokens
    Link {
        /// User id the credential belongs to
        #[arg(long, env = "LOCALCAST_USER")]
        user: String,

        /// Provider name (google, instagram)
        provider: String,

        /// Access token; omit to read it from stdin
        #[arg(long)]
        access_token: Option<String>,

        /// Refresh token, if the provider issued one
        #[arg(long)]
        refresh_token: Option<String>,

        /// Provider account id captured at link time
        #[arg(long)]
        account_id: Option<String>,

        /// Token expiry as a Unix timestamp
        #[arg(long)]
        expires_at: Option<i64>,
    },

    /// Unlink a provider (idempotent)
    Unlink {
        /// User id the credential belongs to
        #[arg(long, env = "LOCALCAST_USER")]
        user: String,

        /// Provider name (google, instagram)
        provider: String,
    },

    /// List a user's linked providers (without showing tokens)
    List {
        /// User id
        #[arg(long, env = "LOCALCAST_USER")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run_command(cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn open_store() -> Result<CredentialStore> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    Ok(CredentialStore::new(db))
}

fn check_provider(provider: &str) -> Result<()> {
    if !PROVIDERS.contains(&provider) {
        anyhow::bail!(
            "Unknown provider '{}'. Valid options: {}",
            provider,
            PROVIDERS.join(", ")
        );
    }
    Ok(())
}

async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Link {
            user,
            provider,
            access_token,
            refresh_token,
            account_id,
            expires_at,
        } => {
            check_provider(&provider)?;

            let access_token = match access_token {
                Some(token) => token,
                None => {
                    // Read from stdin so the token stays out of shell history
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer.trim().to_string()
                }
            };

            if access_token.is_empty() {
                anyhow::bail!("Access token cannot be empty");
            }

            let store = open_store().await?;
            store
                .upsert(&Credential {
                    user_id: user.clone(),
                    provider: provider.clone(),
                    provider_account_id: account_id,
                    access_token,
                    refresh_token,
                    expires_at,
                    updated_at: chrono::Utc::now().timestamp(),
                })
                .await?;

            println!("Linked {} for user {}", provider, user);
            Ok(())
        }

        Commands::Unlink { user, provider } => {
            check_provider(&provider)?;

            let store = open_store().await?;
            store.delete(&user, &provider).await?;

            println!("Unlinked {} for user {}", provider, user);
            Ok(())
        }

        Commands::List { user } => {
            let store = open_store().await?;
            let credentials = store.for_user(&user).await?;

            if credentials.is_empty() {
                println!("No linked providers for user {}", user);
                return Ok(());
            }

            for credential in credentials {
                let expiry = credential
                    .expires_at
                    .map(|t| format!("expires {}", t))
                    .unwrap_or_else(|| "no expiry recorded".to_string());
                println!(
                    "{:<10} linked (updated {}, {})",
                    credential.provider, credential.updated_at, expiry
                );
            }
            Ok(())
        }
    }
}
