// Browser capability — the slice of a headless browser the watcher needs.
//
// The session drives a page (navigate, reload, wait for network idle) and
// listens to its network responses. These traits are that contract; the
// chrome module implements it over CDP, tests implement it in memory.

pub mod chrome;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// Resource type of the request behind a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Xhr,
    Other,
}

/// A network response observed on a page.
///
/// The body is fetched lazily; most responses are never read.
pub struct ResponseEvent {
    pub request_url: String,
    pub kind: ResourceKind,
    pub body: BoxFuture<'static, Result<String>>,
}

impl std::fmt::Debug for ResponseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEvent")
            .field("request_url", &self.request_url)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// One browser tab.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to `url` and wait until the network goes idle.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Reload the current page and wait until the network goes idle.
    async fn reload(&self) -> Result<()>;

    /// Subscribe to every response the page receives from now on.
    async fn responses(&self) -> Result<BoxStream<'static, ResponseEvent>>;

    /// Close the tab.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A running browser process (launched by us or connected to).
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>>;

    /// Shut the browser down. Only called by whoever owns it.
    async fn close(&self) -> Result<()>;
}

/// Starts a browser on demand.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<std::sync::Arc<dyn BrowserDriver>>;
}
