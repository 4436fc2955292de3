// Notifier trait — the outbound delivery seam.
//
// The webhook implementation is what runs in production. LogNotifier prints
// to the terminal for dry runs.

use anyhow::Result;
use async_trait::async_trait;

use super::Notification;
use crate::output::terminal::display_notification;

/// Deliver one notification somewhere. An error means this delivery failed;
/// callers don't retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Prints notifications instead of sending them (`watch --dry-run`).
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        display_notification(notification);
        Ok(())
    }
}
