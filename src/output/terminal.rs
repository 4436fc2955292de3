// Colored terminal output for notifications and watch status.
//
// Used by dry runs and `replay`; the production path delivers over HTTP and
// only logs.

use colored::Colorize;

use crate::notify::Notification;
use crate::pipeline::state::{FeedWatch, WatchPhase};

/// Longest body excerpt shown per notification.
const BODY_PREVIEW_CHARS: usize = 280;

/// Print one notification as a small card.
pub fn display_notification(notification: &Notification) {
    println!("{}", format!("=== {} ===", notification.title).bold());
    for line in truncate_body(&notification.body).lines() {
        println!("  {line}");
    }
    println!("  {} {}", "url:".dimmed(), notification.url);
    if !notification.pic_url.is_empty() {
        println!("  {} {}", "pic:".dimmed(), notification.pic_url);
    }
    println!();
}

/// Print where a watch currently stands.
pub fn display_watch_status(watch: &FeedWatch) {
    let status = match watch.phase() {
        WatchPhase::Uninitialized => "waiting for the profile index".yellow().to_string(),
        WatchPhase::Unresolvable { display_name } => {
            format!("{} has no post feed tab", display_name)
                .red()
                .to_string()
        }
        WatchPhase::IdentityResolved(identity) => format!(
            "{} (container {}), watermark not seeded yet",
            identity.display_name, identity.feed_container_id
        ),
        WatchPhase::WatermarkSeeded(identity, watermark)
        | WatchPhase::Steady(identity, watermark) => format!(
            "{} (container {}), latest seen {}",
            identity.display_name,
            identity.feed_container_id,
            watermark.to_rfc3339()
        )
        .green()
        .to_string(),
    };
    println!("{} {}: {}", "Watch".bold(), watch.uid(), status);
}

fn truncate_body(body: &str) -> String {
    super::truncate_chars(body, BODY_PREVIEW_CHARS)
}
