// weibo-watch: new-post notifications for a single Weibo profile.
//
// This is the library root. Each module corresponds to one stage between the
// browser's network traffic and a delivered notification.

pub mod browser;
pub mod config;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod weibo;
