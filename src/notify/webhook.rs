// HTTP webhook delivery.
//
// POSTs each notification as a urlencoded form (title, body, url, picurl) to
// the configured endpoint, with an optional X-API-Key header. Any non-2xx
// status is a failed delivery and carries the response body for diagnosis.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::traits::Notifier;
use super::Notification;
use crate::output::truncate_chars;

/// Header carrying the optional delivery credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent("weibo-watch/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    /// Build (but don't send) the delivery request for a notification.
    pub fn build_request(&self, notification: &Notification) -> Result<reqwest::Request> {
        let mut request = self.client.post(&self.endpoint).form(notification);
        if let Some(ref key) = self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        request
            .build()
            .with_context(|| format!("Failed to build delivery request for {}", self.endpoint))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let request = self.build_request(notification)?;

        debug!(url = %notification.url, "Delivering notification");

        let response = self
            .client
            .execute(request)
            .await
            .with_context(|| format!("Notification request to {} failed", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Notification endpoint returned {}: {}",
                status,
                truncate_chars(&body, 500)
            );
        }

        Ok(())
    }
}
