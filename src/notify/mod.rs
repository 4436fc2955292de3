// Notification delivery — the record we emit per new post and where it goes.
//
// The session produces Notification values onto a channel; the dispatch loop
// drains it through a Notifier. Delivery is at most once: a failed delivery
// is logged and dropped, the post already counts as seen.

pub mod dispatch;
pub mod traits;
pub mod webhook;

use serde::Serialize;

/// A delivery-ready summary of one new post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// The account's display name
    pub title: String,
    /// Sanitized post text
    pub body: String,
    /// Link to the post (or to the article it carries)
    pub url: String,
    /// Media link, empty when the post has none
    #[serde(rename = "picurl")]
    pub pic_url: String,
}
