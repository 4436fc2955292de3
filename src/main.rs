use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info, warn};

use weibo_watch::browser::chrome::{self, ChromeLauncher};
use weibo_watch::config::Config;
use weibo_watch::notify::traits::{LogNotifier, Notifier};
use weibo_watch::notify::webhook::WebhookNotifier;
use weibo_watch::pipeline::state::{FeedResponse, FeedWatch, PhaseKind};
use weibo_watch::session::{FeedSession, DEFAULT_CHANNEL_CAPACITY};

/// weibo-watch: notifications for new posts on a Weibo profile.
///
/// Loads the profile in a headless browser, watches the feed requests the
/// page makes, and sends one notification per new original post.
#[derive(Parser)]
#[command(name = "weibo-watch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the profile and deliver notifications until a fatal error
    Watch {
        /// Profile id to watch (overrides WEIBO_UID)
        #[arg(long)]
        uid: Option<String>,

        /// Print notifications instead of delivering them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run saved feed payloads through the watch offline
    Replay {
        /// Profile id the payloads belong to (overrides WEIBO_UID)
        #[arg(long)]
        uid: Option<String>,

        /// JSON bodies in capture order: the profile index first, then card lists
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("weibo_watch=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { uid, dry_run } => {
            let mut config = Config::load()?;
            if let Some(uid) = uid {
                config.weibo_uid = uid;
            }
            config.require_uid()?;
            if !dry_run {
                config.require_delivery()?;
            }

            let notifier: Box<dyn Notifier> = if dry_run {
                Box::new(LogNotifier)
            } else {
                Box::new(WebhookNotifier::new(&config.api_url, config.api_key.clone())?)
            };

            let (mut session, notifications) = match config.chrome_cdp_url {
                Some(ref url) => {
                    let browser = chrome::connect(url, config.network_idle_timeout).await?;
                    FeedSession::with_browser(&config.weibo_uid, browser, DEFAULT_CHANNEL_CAPACITY)
                }
                None => FeedSession::launching(
                    &config.weibo_uid,
                    Box::new(ChromeLauncher::new(config.chrome())),
                    DEFAULT_CHANNEL_CAPACITY,
                ),
            };

            let delivery = tokio::spawn(async move {
                weibo_watch::notify::dispatch::run(notifications, notifier.as_ref()).await
            });

            info!(uid = %config.weibo_uid, interval = ?config.poll_interval, "Watching profile");
            let result = poll(&mut session, config.poll_interval).await;
            if let Err(ref e) = result {
                error!(error = %format!("{e:#}"), "Watch stopped on error, exiting...");
            }

            if let Err(e) = session.close().await {
                warn!(error = %e, "Teardown failed");
            }
            // Dropping the session closes the notification channel.
            drop(session);
            let delivered = delivery.await.context("Delivery task panicked")?;
            info!(delivered = delivered, "Notifications delivered this session");

            result?;
        }

        Commands::Replay { uid, files } => {
            let mut config = Config::load()?;
            if let Some(uid) = uid {
                config.weibo_uid = uid;
            }
            config.require_uid()?;
            let uid = config.weibo_uid;

            let mut watch = FeedWatch::new(uid.clone());
            let mut total = 0;

            for path in &files {
                let body = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;

                // Card lists are only accepted for the resolved container, so
                // synthesize the request URL the page would have used.
                let request_url = match watch.identity() {
                    Some(identity) => {
                        weibo_watch::weibo::card_list_request_url(&uid, &identity.feed_container_id)
                    }
                    None => weibo_watch::weibo::index_request_url(&uid),
                };

                let step = watch.apply(FeedResponse {
                    request_url: &request_url,
                    body: &body,
                });
                println!("{} {}", format!("{}:", path.display()).dimmed(), step.outcome);

                for notification in &step.notifications {
                    weibo_watch::output::terminal::display_notification(notification);
                }
                total += step.notifications.len();
            }

            println!();
            weibo_watch::output::terminal::display_watch_status(&watch);
            println!("{}", format!("{total} notification(s)").bold());
        }
    }

    Ok(())
}

/// The poll loop: update, check we can make progress, sleep, repeat.
/// Only returns on a fatal error.
async fn poll(session: &mut FeedSession, interval: Duration) -> Result<()> {
    loop {
        session.update().await.context("Profile update failed")?;

        if session.phase().await == PhaseKind::Unresolvable {
            anyhow::bail!(
                "Profile {} lists no post feed tab; nothing to watch",
                session.uid()
            );
        }

        session.sleep(interval).await.context("Poll sleep failed")?;
    }
}
