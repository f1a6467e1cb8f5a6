//! local-post - Compose and publish local-presence posts
//!
//! Publishes immediately, saves a draft, or schedules a post for the
//! sweep daemon to pick up. All operations are scoped to the user given
//! with --user; this binary never touches another user's data.

use clap::{Parser, Subcommand};
use liblocalcast::publisher::create_publishers;
use liblocalcast::{
    Config, CredentialStore, Database, FanoutPublisher, LocalcastError, Post, PostStatus, Result,
    TargetPlatforms,
};

#[derive(Parser, Debug)]
#[command(name = "local-post")]
#[command(version)]
#[command(about = "Compose and publish posts to Google Business Profile and Instagram", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Authenticated user id (supplied by the calling dashboard session)
    #[arg(long, global = true, env = "LOCALCAST_USER")]
    user: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a post and publish or schedule it
    New {
        /// Post text content
        content: String,

        /// Image URL to attach (required for Instagram)
        #[arg(long)]
        image_url: Option<String>,

        /// Target platform: gbp, instagram, or both
        #[arg(short, long, default_value = "both")]
        platform: String,

        /// Save as draft without publishing
        #[arg(short, long)]
        draft: bool,

        /// Schedule for later instead of publishing now
        /// (e.g. "2h", "tomorrow", "next friday 10am")
        #[arg(short, long)]
        schedule: Option<String>,
    },

    /// Publish an existing draft, failed, or scheduled post now
    Publish {
        /// Post id
        post_id: String,
    },

    /// List the user's posts
    List {
        /// Maximum number of posts to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show one post with its per-platform publish attempts
    Show {
        /// Post id
        post_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        liblocalcast::logging::init_default();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let user = cli.user.clone().ok_or_else(|| {
        LocalcastError::InvalidInput(
            "A user id is required (--user or LOCALCAST_USER)".to_string(),
        )
    })?;
    let format = cli.format.clone();

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::New {
            content,
            image_url,
            platform,
            draft,
            schedule,
        } => {
            new_post(
                &format, &config, &db, &user, content, image_url, &platform, draft, schedule,
            )
            .await
        }
        Commands::Publish { post_id } => {
            publish_existing(&format, &config, &db, &user, &post_id).await
        }
        Commands::List { limit } => list_posts(&format, &db, &user, limit).await,
        Commands::Show { post_id } => show_post(&format, &db, &user, &post_id).await,
    }
}

async fn publish_existing(
    format: &str,
    config: &Config,
    db: &Database,
    user: &str,
    post_id: &str,
) -> Result<()> {
    let post = db
        .get_post_for_user(post_id, user)
        .await?
        .ok_or_else(|| LocalcastError::InvalidInput(format!("Post not found: {}", post_id)))?;

    match post.status {
        PostStatus::Published => {
            return Err(LocalcastError::InvalidInput(format!(
                "Post {} is already published",
                post_id
            )));
        }
        PostStatus::Publishing => {
            return Err(LocalcastError::InvalidInput(format!(
                "Post {} is being published right now",
                post_id
            )));
        }
        // A scheduled post must be claimed first so a concurrently
        // running sweep cannot publish it a second time
        PostStatus::Scheduled => {
            if !db.claim_for_publishing(post_id).await? {
                return Err(LocalcastError::InvalidInput(format!(
                    "Post {} is being published right now",
                    post_id
                )));
            }
        }
        PostStatus::Draft | PostStatus::Failed => {}
    }

    let credentials = CredentialStore::new(db.clone()).for_user(user).await?;
    let publisher = FanoutPublisher::new(create_publishers(config)?, db.clone());

    let report = publisher.publish(&post, &credentials).await?;
    print_report(format, &report);

    if report.status == PostStatus::Failed {
        if let Some(error) = report.outcomes.iter().find_map(|o| o.error.clone()) {
            return Err(LocalcastError::Platform(
                liblocalcast::error::PlatformError::Publish(error),
            ));
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn new_post(
    format: &str,
    config: &Config,
    db: &Database,
    user: &str,
    content: String,
    image_url: Option<String>,
    platform: &str,
    draft: bool,
    schedule: Option<String>,
) -> Result<()> {
    if content.trim().is_empty() {
        return Err(LocalcastError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }

    let platform = TargetPlatforms::parse(platform).ok_or_else(|| {
        LocalcastError::InvalidInput(format!(
            "Unknown platform '{}'. Valid options: gbp, instagram, both",
            platform
        ))
    })?;

    let mut post = Post::draft(user.to_string(), content, platform);
    if let Some(url) = image_url {
        post = post.with_image(url);
    }

    // Draft: persist and stop
    if draft {
        db.create_post(&post).await?;
        print_created(format, &post, "draft");
        return Ok(());
    }

    // Scheduled: persist for the sweep daemon
    if let Some(schedule) = schedule {
        let at = liblocalcast::scheduling::parse_schedule(&schedule)?;
        let now = chrono::Utc::now().timestamp();
        let post = post.schedule(at.timestamp(), now)?;
        db.create_post(&post).await?;
        print_created(format, &post, "scheduled");
        return Ok(());
    }

    // Publish now, scoped to this user's own credentials
    db.create_post(&post).await?;

    let credentials = CredentialStore::new(db.clone()).for_user(user).await?;
    let publishers = create_publishers(config)?;
    let publisher = FanoutPublisher::new(publishers, db.clone());

    let report = publisher.publish(&post, &credentials).await?;
    print_report(format, &report);

    if report.status == PostStatus::Failed {
        // Surface the first platform failure as the process outcome
        if let Some(error) = report.outcomes.iter().find_map(|o| o.error.clone()) {
            return Err(LocalcastError::Platform(
                liblocalcast::error::PlatformError::Publish(error),
            ));
        }
    }

    Ok(())
}

fn print_report(format: &str, report: &liblocalcast::PublishReport) {
    if format == "json" {
        let outcomes: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| {
                serde_json::json!({
                    "platform": o.platform.as_str(),
                    "success": o.success,
                    "platform_post_id": o.platform_post_id,
                    "error": o.error,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "post_id": report.post_id,
                "status": report.status.as_str(),
                "results": outcomes,
            })
        );
    } else {
        for outcome in &report.outcomes {
            if outcome.success {
                println!(
                    "✓ {}: {}",
                    outcome.platform,
                    outcome.platform_post_id.as_deref().unwrap_or("-")
                );
            } else {
                println!(
                    "✗ {}: {}",
                    outcome.platform,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        println!("Post {} is {}", report.post_id, report.status);
    }
}

fn print_created(format: &str, post: &Post, kind: &str) {
    if format == "json" {
        println!(
            "{}",
            serde_json::json!({
                "post_id": post.id,
                "status": post.status.as_str(),
                "scheduled_at": post.scheduled_at,
            })
        );
    } else {
        match post.scheduled_at {
            Some(at) => println!("Saved {} {} (due at {})", kind, post.id, at),
            None => println!("Saved {} {}", kind, post.id),
        }
    }
}

async fn list_posts(format: &str, db: &Database, user: &str, limit: usize) -> Result<()> {
    let posts = db.list_posts_for_user(user, limit).await?;

    if format == "json" {
        println!("{}", serde_json::to_string(&posts).unwrap_or_default());
        return Ok(());
    }

    if posts.is_empty() {
        println!("No posts yet");
        return Ok(());
    }

    for post in posts {
        println!(
            "{}  {:<10} {:<9} {}",
            post.id,
            post.status,
            post.platform,
            truncate(&post.content, 48)
        );
    }
    Ok(())
}

async fn show_post(format: &str, db: &Database, user: &str, post_id: &str) -> Result<()> {
    // Ownership check before reading the attempt history
    let post = db
        .get_post_for_user(post_id, user)
        .await?
        .ok_or_else(|| LocalcastError::InvalidInput(format!("Post not found: {}", post_id)))?;

    let attempts = db.get_attempts(post_id).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::json!({
                "post": post,
                "attempts": attempts,
            })
        );
        return Ok(());
    }

    println!("Post {}", post.id);
    println!("  status:    {}", post.status);
    println!("  platform:  {}", post.platform);
    println!("  content:   {}", truncate(&post.content, 72));
    if let Some(url) = &post.image_url {
        println!("  image:     {}", url);
    }
    if let Some(at) = post.scheduled_at {
        println!("  scheduled: {}", at);
    }
    if let Some(at) = post.published_at {
        println!("  published: {}", at);
    }
    if let Some(id) = &post.external_id {
        println!("  external:  {}", id);
    }

    if !attempts.is_empty() {
        println!("  attempts:");
        for a in attempts {
            if a.success {
                println!(
                    "    ✓ {} {}",
                    a.platform,
                    a.platform_post_id.as_deref().unwrap_or("-")
                );
            } else {
                println!(
                    "    ✗ {} {}",
                    a.platform,
                    a.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}…", cut)
    }
}
