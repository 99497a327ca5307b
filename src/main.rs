use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discourse_thread_migrator::config::Config;
use discourse_thread_migrator::forum::ForumClient;
use discourse_thread_migrator::sync::BackfillEngine;
use discourse_thread_migrator::wiki;

#[derive(Debug, Parser)]
#[command(
    name = "discourse-thread-migrator",
    version,
    about = "Mirror wiki-hosted discussion threads into a Discourse forum"
)]
struct Cli {
    /// Actually run the migration. Without this flag the tool prints the
    /// operational preconditions and exits with no side effects.
    #[arg(long)]
    launch: bool,

    /// Restrict the run to threads attached to one wiki page.
    #[arg(long, value_name = "PAGE_ID")]
    page: Option<i64>,
}

const PRECONDITIONS: &str = "\
This tool replays every wiki discussion thread into the forum.

Before re-running with --launch:
  1. Back up the forum database; the migration is not reversible.
  2. Disable outbound email on the forum, or every replayed post will
     notify its participants.
  3. Relax the forum rate limits and the minimum post length so short
     historical comments are accepted.

No request has been made. Re-run with --launch to start.";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let cli = Cli::parse();
    if !cli.launch {
        println!("{PRECONDITIONS}");
        return Ok(());
    }

    info!("Starting discourse-thread-migrator");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        forum = %config.forum_url,
        wiki = %config.wiki_url,
        "Configuration loaded"
    );
    if config.follower_directory_url.is_none() {
        info!("No follower directory configured; follower sync disabled");
    }

    let db = wiki::Database::open(&config.wiki_db_path).await?;
    let client = ForumClient::new(
        &config.forum_url,
        &config.forum_api_key,
        &config.forum_api_username,
        config.request_timeout,
    );

    // Interrupts stop the run at the next thread boundary rather than
    // mid-replay.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Interrupt received; finishing the current thread first");
            cancel.cancel();
        });
    }

    let engine = BackfillEngine::new(config, db, client, cancel);
    let summary = engine.run(cli.page).await?;

    info!(
        threads = summary.threads_processed,
        topics = summary.topics_created,
        posts = summary.posts_created,
        watches = summary.watches_issued,
        "Migration finished"
    );

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discourse_thread_migrator=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
