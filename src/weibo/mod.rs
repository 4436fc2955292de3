// Weibo mobile site surface — URLs, the feed index endpoint, and payload schemas.
//
// The watcher never calls the Weibo API directly. The profile page at
// m.weibo.cn issues XHRs against `/api/container/getIndex` and we read the
// responses as they go by. This module knows what those requests and
// responses look like.

pub mod schema;

use reqwest::Url;

/// Base of the mobile site. Profile pages and status links hang off this.
pub const MOBILE_BASE_URL: &str = "https://m.weibo.cn";

/// Path fragment identifying the feed index XHR.
pub const INDEX_ENDPOINT: &str = "/api/container/getIndex";

/// The only card type that represents a genuine feed post.
pub const POST_CARD_TYPE: i64 = 9;

/// The tab type of the profile's post feed in the index payload.
pub const FEED_TAB_TYPE: &str = "weibo";

/// Profile page for a user id (the page the browser session loads).
pub fn profile_url(uid: &str) -> String {
    format!("{MOBILE_BASE_URL}/u/{uid}")
}

/// Canonical link to a single post.
pub fn status_url(post_id: &str) -> String {
    format!("{MOBILE_BASE_URL}/status/{post_id}")
}

/// Whether a request URL hits the feed index endpoint.
pub fn is_index_request(url: &str) -> bool {
    url.contains(INDEX_ENDPOINT)
}

/// Whether a request's query string selects the given feed container.
///
/// Matches on an exact `containerid` parameter value. A URL that fails to
/// parse never matches.
pub fn request_targets_container(request_url: &str, container_id: &str) -> bool {
    let Ok(url) = Url::parse(request_url) else {
        return false;
    };
    url.query_pairs()
        .any(|(key, value)| key == "containerid" && value == container_id)
}

/// Index endpoint URL for a user's profile info (the first XHR the page makes).
pub fn index_request_url(uid: &str) -> String {
    format!("{MOBILE_BASE_URL}{INDEX_ENDPOINT}?type=uid&value={uid}")
}

/// Index endpoint URL for one feed container (the card list XHR).
pub fn card_list_request_url(uid: &str, container_id: &str) -> String {
    format!("{MOBILE_BASE_URL}{INDEX_ENDPOINT}?type=uid&value={uid}&containerid={container_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_profile_and_status_urls() {
        assert_eq!(profile_url("6279793937"), "https://m.weibo.cn/u/6279793937");
        assert_eq!(status_url("5100"), "https://m.weibo.cn/status/5100");
    }

    #[test]
    fn container_match_requires_exact_parameter() {
        let url = card_list_request_url("1", "1076031");
        assert!(request_targets_container(&url, "1076031"));
        assert!(!request_targets_container(&url, "107603"));
        assert!(!request_targets_container(&index_request_url("1"), "1076031"));
    }

    #[test]
    fn container_match_tolerates_garbage_urls() {
        assert!(!request_targets_container("not a url", "1076031"));
        assert!(!request_targets_container("", "1076031"));
    }

    #[test]
    fn index_request_detection() {
        assert!(is_index_request(&index_request_url("42")));
        assert!(!is_index_request("https://m.weibo.cn/api/config"));
    }
}
