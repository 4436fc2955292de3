// Payload pipeline — from a validated response body to notifications.
//
// sanitize and classify are pure per-batch functions; state holds the
// watch's identity and watermark and is the only part that remembers
// anything between responses.

pub mod classify;
pub mod sanitize;
pub mod state;
