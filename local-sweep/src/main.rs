//! local-sweep - Background daemon for scheduled publishing
//!
//! Polls the post queue at a fixed interval and pushes every due
//! scheduled post through the fan-out publisher. This is the only
//! process that reads across all users' posts and credentials; it must
//! never be exposed to user-supplied requests.

use clap::Parser;
use liblocalcast::publisher::create_publishers;
use liblocalcast::{Config, CredentialStore, Database, FanoutPublisher, Result, SweepRunner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "local-sweep")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
local-sweep - Background daemon for scheduled publishing

DESCRIPTION:
    local-sweep is a long-running daemon that watches the post queue and
    publishes scheduled content when its time arrives.

    Each cycle it queries for posts with status 'scheduled' whose
    scheduled time has elapsed, claims each one, loads the owner's
    provider credentials, and fans the post out to its target platforms.
    Per-platform failures are recorded against the post; a post visible
    on at least one platform is marked published.

USAGE:
    # Run in foreground (logs to stderr)
    local-sweep

    # Run with custom poll interval
    local-sweep --poll-interval 60

    # Process due posts once and exit (cron-style invocation)
    local-sweep --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/localcast/config.toml
    Database location: ~/.local/share/localcast/localcast.db

    [sweep]
    poll_interval = 300  # seconds between cycles

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one sweep cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    let runner = SweepRunner::new(
        db.clone(),
        CredentialStore::new(db.clone()),
        FanoutPublisher::new(create_publishers(&config)?, db),
    );

    info!("local-sweep daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.sweep.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        run_cycle(&runner).await;
        info!("local-sweep: processed posts once, exiting");
    } else {
        run_daemon_loop(&runner, poll_interval, shutdown).await;
    }

    info!("local-sweep daemon stopped");
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        liblocalcast::LocalcastError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

async fn run_daemon_loop(runner: &SweepRunner, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        run_cycle(runner).await;

        // Sleep until the next poll, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

/// One sweep cycle. A failed cycle (e.g. storage briefly unavailable)
/// is logged and retried on the next tick.
async fn run_cycle(runner: &SweepRunner) {
    match runner.run_once().await {
        Ok(summary) => {
            if summary.processed > 0 {
                info!("Sweep processed {} post(s)", summary.processed);
                for entry in &summary.entries {
                    if entry.errors.is_empty() {
                        info!("  {} -> {}", entry.post_id, entry.status);
                    } else {
                        info!(
                            "  {} -> {} ({})",
                            entry.post_id,
                            entry.status,
                            entry.errors.join("; ")
                        );
                    }
                }
            }
        }
        Err(e) => {
            error!("Sweep cycle failed: {}", e);
        }
    }
}
