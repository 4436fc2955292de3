// Feed session — owns the browser page and drives the watch.
//
// The session opens the profile page on first update, then reloads it on
// every later one. A background task listens to the page's responses; each
// feed index XHR is handed to its own task, which fetches the body and runs
// it through FeedWatch. New-post notifications leave through a bounded
// channel the caller drains.
//
// The browser is either launched by the session (and closed with it) or
// supplied from outside (and left running on close).

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::{BrowserDriver, BrowserLauncher, PageDriver, ResourceKind, ResponseEvent};
use crate::notify::Notification;
use crate::output::truncate_chars;
use crate::pipeline::state::{FeedResponse, FeedWatch, Outcome, PhaseKind};
use crate::weibo::{is_index_request, profile_url};

/// Default notification channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The page is gone (the session was closed).
    #[error("page is not initialized")]
    NotInitialized,

    #[error("browser failure: {0:#}")]
    Browser(anyhow::Error),
}

/// Whether the session must shut the browser down when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Launched by this session; closed by it.
    Owned,
    /// Supplied by the caller; never closed by the session.
    Borrowed,
}

enum PageSlot {
    Unopened,
    Open(Box<dyn PageDriver>),
    Closed,
}

pub struct FeedSession {
    uid: String,
    launcher: Option<Box<dyn BrowserLauncher>>,
    browser: Option<Arc<dyn BrowserDriver>>,
    ownership: Ownership,
    page: PageSlot,
    listener: Option<JoinHandle<()>>,
    watch: Arc<Mutex<FeedWatch>>,
    notifications: mpsc::Sender<Notification>,
}

impl FeedSession {
    /// A session that launches (and later closes) its own browser.
    pub fn launching(
        uid: impl Into<String>,
        launcher: Box<dyn BrowserLauncher>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        Self::build(uid.into(), Some(launcher), None, Ownership::Owned, capacity)
    }

    /// A session on a browser someone else owns.
    pub fn with_browser(
        uid: impl Into<String>,
        browser: Arc<dyn BrowserDriver>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        Self::build(uid.into(), None, Some(browser), Ownership::Borrowed, capacity)
    }

    fn build(
        uid: String,
        launcher: Option<Box<dyn BrowserLauncher>>,
        browser: Option<Arc<dyn BrowserDriver>>,
        ownership: Ownership,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            watch: Arc::new(Mutex::new(FeedWatch::new(uid.clone()))),
            uid,
            launcher,
            browser,
            ownership,
            page: PageSlot::Unopened,
            listener: None,
            notifications: tx,
        };
        (session, rx)
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Current phase of the underlying watch.
    pub async fn phase(&self) -> PhaseKind {
        self.watch.lock().await.phase_kind()
    }

    /// A copy of the current watch state.
    pub async fn snapshot(&self) -> FeedWatch {
        self.watch.lock().await.clone()
    }

    /// Load the profile page the first time, reload it after that.
    pub async fn update(&mut self) -> Result<(), SessionError> {
        match &self.page {
            PageSlot::Unopened => self.start().await,
            PageSlot::Open(page) => {
                debug!(uid = %self.uid, "Reloading profile page");
                page.reload().await.map_err(SessionError::Browser)
            }
            PageSlot::Closed => Err(SessionError::NotInitialized),
        }
    }

    /// Wait between polls.
    pub async fn sleep(&self, duration: Duration) -> Result<(), SessionError> {
        if !matches!(self.page, PageSlot::Open(_)) {
            return Err(SessionError::NotInitialized);
        }
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Release the page, and the browser if this session launched it.
    ///
    /// Safe to call more than once. Every resource is released even if an
    /// earlier step fails; the first failure is returned.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }

        let mut result = Ok(());

        if let PageSlot::Open(page) = std::mem::replace(&mut self.page, PageSlot::Closed) {
            if let Err(e) = page.close().await {
                warn!(error = %format!("{e:#}"), "Failed to close page");
                result = Err(SessionError::Browser(e));
            }
        }

        if let Some(browser) = self.browser.take() {
            if self.ownership == Ownership::Owned {
                if let Err(e) = browser.close().await {
                    warn!(error = %format!("{e:#}"), "Failed to close browser");
                    if result.is_ok() {
                        result = Err(SessionError::Browser(e));
                    }
                }
            }
        }

        result
    }

    async fn start(&mut self) -> Result<(), SessionError> {
        let browser = self.acquire_browser().await?;
        let page = browser.new_page().await.map_err(SessionError::Browser)?;

        let responses = page.responses().await;
        // Keep the page even if subscribing failed so close() releases it.
        self.page = PageSlot::Open(page);
        let responses = responses.map_err(SessionError::Browser)?;

        self.listener = Some(tokio::spawn(listen(
            responses,
            self.watch.clone(),
            self.notifications.clone(),
        )));

        let url = profile_url(&self.uid);
        info!(uid = %self.uid, url = %url, "Opening profile page");
        match &self.page {
            PageSlot::Open(page) => page.goto(&url).await.map_err(SessionError::Browser),
            _ => Err(SessionError::NotInitialized),
        }
    }

    async fn acquire_browser(&mut self) -> Result<Arc<dyn BrowserDriver>, SessionError> {
        if let Some(ref browser) = self.browser {
            return Ok(browser.clone());
        }
        let launcher = self.launcher.as_ref().ok_or(SessionError::NotInitialized)?;
        let browser = launcher.launch().await.map_err(SessionError::Browser)?;
        self.browser = Some(browser.clone());
        Ok(browser)
    }
}

/// Whether a response is one the watch cares about.
pub fn is_feed_response(event: &ResponseEvent) -> bool {
    event.kind == ResourceKind::Xhr && is_index_request(&event.request_url)
}

async fn listen(
    mut responses: futures::stream::BoxStream<'static, ResponseEvent>,
    watch: Arc<Mutex<FeedWatch>>,
    notifications: mpsc::Sender<Notification>,
) {
    while let Some(event) = responses.next().await {
        if !is_feed_response(&event) {
            continue;
        }
        // Don't hold up the event stream while the body loads.
        tokio::spawn(handle_response(event, watch.clone(), notifications.clone()));
    }
    debug!("Response stream ended");
}

async fn handle_response(
    event: ResponseEvent,
    watch: Arc<Mutex<FeedWatch>>,
    notifications: mpsc::Sender<Notification>,
) {
    let request_url = event.request_url;
    let body = match event.body.await {
        Ok(body) => body,
        Err(e) => {
            warn!(url = %request_url, error = %format!("{e:#}"), "Failed to read feed response");
            return;
        }
    };

    let step = {
        let mut watch = watch.lock().await;
        watch.apply(FeedResponse {
            request_url: &request_url,
            body: &body,
        })
    };

    match &step.outcome {
        Outcome::Rejected(e) => {
            debug!(url = %request_url, error = %e, "Discarding payload");
        }
        Outcome::OtherContainer => {
            debug!(url = %request_url, "Card list for another container");
        }
        Outcome::IdentityResolved => {
            let watch = watch.lock().await;
            if let Some(identity) = watch.identity() {
                info!(
                    display_name = %identity.display_name,
                    container_id = %identity.feed_container_id,
                    "Resolved account"
                );
            }
        }
        Outcome::IdentityUnresolvable => {
            warn!(url = %request_url, "Profile index lists no post feed tab");
        }
        Outcome::Seeded { watermark } => {
            info!(watermark = %watermark, "Watermark seeded");
        }
        Outcome::Empty => {
            debug!(url = %request_url, "Card list had no datable cards");
        }
        Outcome::Processed {
            candidates,
            watermark,
        } => {
            debug!(candidates = candidates, watermark = %watermark, "Processed card list");
        }
    }

    for notification in step.notifications {
        info!(
            url = %notification.url,
            text = %truncate_chars(&notification.body, 60),
            "New post"
        );
        if notifications.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
            return;
        }
    }
}
