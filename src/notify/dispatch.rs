// Delivery loop — drains the session's notification channel.
//
// Runs alongside the poll loop. Notifications are delivered one at a time in
// the order they were produced. A failure is logged and the loop moves on.

use tokio::sync::mpsc::Receiver;
use tracing::{error, info};

use super::traits::Notifier;
use super::Notification;

/// Deliver everything that comes through `notifications` until the channel
/// closes. Returns how many deliveries succeeded.
pub async fn run(mut notifications: Receiver<Notification>, notifier: &dyn Notifier) -> usize {
    let mut delivered = 0;

    while let Some(notification) = notifications.recv().await {
        match notifier.deliver(&notification).await {
            Ok(()) => {
                delivered += 1;
                info!(url = %notification.url, "Notification sent");
            }
            Err(e) => {
                error!(url = %notification.url, error = %format!("{e:#}"), "Failed to send notification");
            }
        }
    }

    delivered
}
