// Post classification — which cards become notifications, and what they link to.
//
// Given one card list batch and the watermark from before the batch, decide
// which cards are new original posts and turn each into a Notification. The
// watermark coming out is the max of the old watermark and every datable card
// in the batch, whether or not that card passed the filters. Taking a max
// makes the result independent of the order batches are processed in.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::sanitize::{is_lottery_spam, sanitize};
use crate::notify::Notification;
use crate::weibo::schema::{Card, Mblog, PageKind};
use crate::weibo::status_url;

/// Result of classifying one batch against a watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedBatch {
    pub notifications: Vec<Notification>,
    /// Watermark after the batch: never earlier than the one passed in.
    pub watermark: DateTime<Utc>,
    /// Original posts newer than the incoming watermark (before the spam filter).
    pub candidates: usize,
}

/// Newest `created_at` across every card in the batch, regardless of type.
pub fn batch_max(cards: &[Card]) -> Option<DateTime<Utc>> {
    cards.iter().filter_map(|card| card.mblog.posted_at()).max()
}

/// Run a batch through the filters and build notifications for new posts.
pub fn classify_batch(cards: &[Card], watermark: DateTime<Utc>, title: &str) -> ClassifiedBatch {
    let mut notifications = Vec::new();
    let mut candidates = 0;

    for card in cards {
        let mblog = &card.mblog;

        if !card.is_post() {
            continue;
        }
        if mblog.is_reshare() {
            debug!(post_id = %mblog.id, "Skipping reshare");
            continue;
        }

        let Some(posted_at) = mblog.posted_at() else {
            debug!(post_id = %mblog.id, created_at = %mblog.created_at, "Unparseable created_at");
            continue;
        };
        if posted_at <= watermark {
            continue;
        }
        candidates += 1;

        let body = sanitize(&mblog.text);
        if is_lottery_spam(&body) {
            debug!(post_id = %mblog.id, "Skipping lottery boilerplate");
            continue;
        }

        notifications.push(Notification {
            title: title.to_string(),
            body,
            url: resolve_url(mblog),
            pic_url: resolve_pic_url(mblog),
        });
    }

    let watermark = batch_max(cards).map_or(watermark, |newest| newest.max(watermark));

    ClassifiedBatch {
        notifications,
        watermark,
        candidates,
    }
}

/// Media link for a post: the attachment cover for articles and videos,
/// otherwise the original picture (or nothing).
pub fn resolve_pic_url(mblog: &Mblog) -> String {
    match &mblog.page_info {
        Some(page) if matches!(page.page_kind(), PageKind::Article | PageKind::Video) => {
            page.picture_url().to_string()
        }
        _ => mblog.original_pic.clone().unwrap_or_default(),
    }
}

/// Display link for a post: the article itself for articles, otherwise the
/// canonical status page.
pub fn resolve_url(mblog: &Mblog) -> String {
    match &mblog.page_info {
        Some(page) if page.page_kind() == PageKind::Article => page.url().to_string(),
        _ => status_url(&mblog.id),
    }
}
