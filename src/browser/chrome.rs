// Chrome over CDP — the production browser capability, built on chromiumoxide.
//
// Either launches a local Chrome/Chromium (session owns it) or connects to one
// that is already running (session borrows it). chromiumoxide needs its
// Handler polled for the connection to make progress, so every browser gets a
// background task that drains it.
//
// "Network idle" is Chrome's own `networkIdle` lifecycle event on the main
// frame. Lifecycle events are switched on once per page; a navigation counts
// as idle only when the `networkIdle` belongs to the document that navigation
// started (same loader id as its `init` event). Anything earlier is left over
// from the previous document.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, ReloadParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Handler, Page};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{BrowserDriver, BrowserLauncher, PageDriver, ResourceKind, ResponseEvent};

/// Chrome's lifecycle event name for "no network activity for 500ms".
const NETWORK_IDLE_EVENT: &str = "networkIdle";

/// First lifecycle event of a new document.
const INIT_EVENT: &str = "init";

/// Request URLs remembered while waiting for their responses. Requests that
/// fail never get one, so the map is reset when it grows past this.
const MAX_PENDING_REQUESTS: usize = 4096;

/// Bodies can be requested before Chrome has finished buffering them.
const BODY_FETCH_RETRIES: u32 = 3;
const BODY_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Launch options for a locally started browser.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Browser binary; chromiumoxide auto-detects one when unset
    pub executable: Option<PathBuf>,
    /// Show a window instead of running headless
    pub headful: bool,
    /// Upper bound on waiting for network idle after navigation or reload
    pub network_idle_timeout: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headful: false,
            network_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Launches a fresh local browser each time the session asks for one.
pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>> {
        let mut builder = BrowserConfig::builder();
        if self.config.headful {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.config.executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser configuration: {e}"))?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch Chrome")?;

        info!(headful = self.config.headful, "Launched browser");

        Ok(Arc::new(ChromeBrowser::new(
            browser,
            handler,
            self.config.network_idle_timeout,
        )))
    }
}

/// Connect to an already running browser's DevTools endpoint.
///
/// `url` may be the `http://host:port` endpoint or the `ws://` debugger URL.
pub async fn connect(url: &str, network_idle_timeout: Duration) -> Result<Arc<dyn BrowserDriver>> {
    let (browser, handler) = Browser::connect(url)
        .await
        .with_context(|| format!("Failed to connect to browser at {url}"))?;

    info!(url = url, "Connected to browser");

    Ok(Arc::new(ChromeBrowser::new(
        browser,
        handler,
        network_idle_timeout,
    )))
}

pub struct ChromeBrowser {
    browser: Mutex<Browser>,
    handler: HandlerTask,
    network_idle_timeout: Duration,
}

/// The task draining chromiumoxide's Handler. Stops when dropped, so a
/// connected browser that is never closed doesn't leave it running.
struct HandlerTask(JoinHandle<()>);

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl ChromeBrowser {
    fn new(browser: Browser, mut handler: Handler, network_idle_timeout: Duration) -> Self {
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler error");
                }
            }
        });

        Self {
            browser: Mutex::new(browser),
            handler: HandlerTask(handler),
            network_idle_timeout,
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("Failed to open a new page")?;
        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .context("Failed to enable lifecycle events")?;

        Ok(Box::new(ChromePage {
            page,
            network_idle_timeout: self.network_idle_timeout,
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("Failed to close browser")?;
        // Reap the child process; a connected browser has none.
        let _ = browser.wait().await;
        self.handler.0.abort();
        Ok(())
    }
}

pub struct ChromePage {
    page: Page,
    network_idle_timeout: Duration,
}

impl ChromePage {
    /// Subscribe to lifecycle events before triggering a navigation, so the
    /// events of the new document can't be missed.
    async fn lifecycle_events(&self) -> Result<EventStream<EventLifecycleEvent>> {
        self.page
            .event_listener::<EventLifecycleEvent>()
            .await
            .context("Failed to subscribe to lifecycle events")
    }

    async fn wait_for_network_idle(
        &self,
        mut events: EventStream<EventLifecycleEvent>,
    ) -> Result<()> {
        let main_frame = self
            .page
            .mainframe()
            .await
            .context("Failed to look up main frame")?;

        let mut navigation = NavigationIdle::new(main_frame.map(|id| id.as_ref().to_string()));

        let idle = async {
            while let Some(event) = events.next().await {
                if navigation.observe(event.frame_id.as_ref(), event.loader_id.as_ref(), &event.name) {
                    return true;
                }
            }
            false
        };

        match tokio::time::timeout(self.network_idle_timeout, idle).await {
            Ok(true) => Ok(()),
            Ok(false) => anyhow::bail!("Page closed before the network went idle"),
            Err(_) => anyhow::bail!(
                "Timed out after {:?} waiting for network idle",
                self.network_idle_timeout
            ),
        }
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let events = self.lifecycle_events().await?;
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        self.wait_for_network_idle(events).await
    }

    async fn reload(&self) -> Result<()> {
        let events = self.lifecycle_events().await?;
        self.page
            .execute(ReloadParams::default())
            .await
            .context("Failed to reload page")?;
        self.page
            .wait_for_navigation()
            .await
            .context("Reload did not finish navigating")?;
        self.wait_for_network_idle(events).await
    }

    async fn responses(&self) -> Result<BoxStream<'static, ResponseEvent>> {
        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("Failed to subscribe to network requests")?;
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to subscribe to network responses")?;

        let page = self.page.clone();
        let mut request_urls = RequestUrls::default();
        let traffic = futures::stream::select(
            requests.map(Traffic::Request),
            responses.map(Traffic::Response),
        );
        let stream = traffic.filter_map(move |traffic| {
            let event = match traffic {
                Traffic::Request(event) => {
                    request_urls.requested(event.request_id.as_ref(), &event.request.url);
                    None
                }
                Traffic::Response(event) => {
                    let kind = if event.r#type == ResourceType::Xhr {
                        ResourceKind::Xhr
                    } else {
                        ResourceKind::Other
                    };
                    Some(ResponseEvent {
                        request_url: request_urls
                            .responded(event.request_id.as_ref(), &event.response.url),
                        kind,
                        body: fetch_body(page.clone(), event.request_id.clone()).boxed(),
                    })
                }
            };
            futures::future::ready(event)
        });

        Ok(stream.boxed())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("Failed to close page")
    }
}

enum Traffic {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
}

/// Tracks the lifecycle of one navigation on the main frame.
#[derive(Debug)]
struct NavigationIdle {
    main_frame: Option<String>,
    loader: Option<String>,
}

impl NavigationIdle {
    fn new(main_frame: Option<String>) -> Self {
        Self {
            main_frame,
            loader: None,
        }
    }

    /// Feed one lifecycle event. True once the document started by this
    /// navigation reports network idle.
    fn observe(&mut self, frame_id: &str, loader_id: &str, name: &str) -> bool {
        if self.main_frame.as_deref().is_some_and(|id| id != frame_id) {
            return false;
        }
        match name {
            INIT_EVENT => {
                self.loader = Some(loader_id.to_string());
                false
            }
            NETWORK_IDLE_EVENT => self.loader.as_deref() == Some(loader_id),
            _ => false,
        }
    }
}

/// The URL each request was first sent to, keyed by request id. Redirects
/// reuse the id, so the page's original request URL is kept.
#[derive(Debug, Default)]
struct RequestUrls {
    urls: HashMap<String, String>,
}

impl RequestUrls {
    fn requested(&mut self, request_id: &str, url: &str) {
        if self.urls.len() >= MAX_PENDING_REQUESTS && !self.urls.contains_key(request_id) {
            self.urls.clear();
        }
        self.urls
            .entry(request_id.to_string())
            .or_insert_with(|| url.to_string());
    }

    /// The originating request URL, or the response URL if the request was
    /// never seen.
    fn responded(&mut self, request_id: &str, response_url: &str) -> String {
        self.urls
            .remove(request_id)
            .unwrap_or_else(|| response_url.to_string())
    }
}

async fn fetch_body(page: Page, request_id: RequestId) -> Result<String> {
    let mut attempt = 0;
    loop {
        match page
            .execute(GetResponseBodyParams::new(request_id.clone()))
            .await
        {
            Ok(response) => {
                return decode_body(&response.result.body, response.result.base64_encoded)
            }
            Err(e) if attempt < BODY_FETCH_RETRIES => {
                attempt += 1;
                debug!(error = %e, attempt = attempt, "Response body not ready, retrying");
                tokio::time::sleep(BODY_RETRY_DELAY).await;
            }
            Err(e) => return Err(e).context("Failed to read response body"),
        }
    }
}

/// CDP hands bodies back either as text or base64.
fn decode_body(body: &str, base64_encoded: bool) -> Result<String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .context("Response body is not valid base64")?;
    String::from_utf8(bytes).context("Response body is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_body_passes_through() {
        assert_eq!(decode_body("{\"ok\":1}", false).unwrap(), "{\"ok\":1}");
    }

    #[test]
    fn base64_body_is_decoded() {
        // {"ok":1}
        assert_eq!(decode_body("eyJvayI6MX0=", true).unwrap(), "{\"ok\":1}");
    }

    #[test]
    fn bad_base64_is_an_error() {
        assert!(decode_body("!!!", true).is_err());
    }

    #[test]
    fn idle_needs_the_new_documents_loader() {
        let mut navigation = NavigationIdle::new(Some("main".to_string()));

        // Left over from the document being replaced.
        assert!(!navigation.observe("main", "old", NETWORK_IDLE_EVENT));

        assert!(!navigation.observe("main", "new", INIT_EVENT));
        assert!(!navigation.observe("main", "old", NETWORK_IDLE_EVENT));
        assert!(!navigation.observe("main", "new", "load"));
        assert!(navigation.observe("main", "new", NETWORK_IDLE_EVENT));
    }

    #[test]
    fn subframe_lifecycle_is_ignored() {
        let mut navigation = NavigationIdle::new(Some("main".to_string()));
        assert!(!navigation.observe("iframe", "ad", INIT_EVENT));
        assert!(!navigation.observe("iframe", "ad", NETWORK_IDLE_EVENT));

        assert!(!navigation.observe("main", "page", INIT_EVENT));
        assert!(!navigation.observe("iframe", "page", NETWORK_IDLE_EVENT));
        assert!(navigation.observe("main", "page", NETWORK_IDLE_EVENT));
    }

    #[test]
    fn redirected_response_keeps_request_url() {
        let mut urls = RequestUrls::default();
        urls.requested("7", "https://m.weibo.cn/api/container/getIndex?containerid=1076031");
        urls.requested("7", "https://m.weibo.cn/api/container/getIndex?redirected=1");

        assert_eq!(
            urls.responded("7", "https://m.weibo.cn/api/container/getIndex?redirected=1"),
            "https://m.weibo.cn/api/container/getIndex?containerid=1076031"
        );
        // Forgotten once answered.
        assert_eq!(urls.responded("7", "https://other/"), "https://other/");
    }

    #[test]
    fn unseen_request_falls_back_to_response_url() {
        let mut urls = RequestUrls::default();
        assert_eq!(urls.responded("9", "https://m.weibo.cn/x"), "https://m.weibo.cn/x");
    }

    #[test]
    fn pending_requests_are_bounded() {
        let mut urls = RequestUrls::default();
        for id in 0..MAX_PENDING_REQUESTS {
            urls.requested(&id.to_string(), "https://a/");
        }
        urls.requested("overflow", "https://b/");
        assert_eq!(urls.urls.len(), 1);
        assert_eq!(urls.responded("overflow", "https://c/"), "https://b/");
    }

    #[tokio::test]
    async fn dropped_handler_task_is_stopped() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = HandlerTask(tokio::spawn(async move {
            let _tx = tx;
            futures::future::pending::<()>().await;
        }));

        drop(task);
        assert!(rx.await.is_err());
    }

    #[test]
    fn default_idle_timeout_is_thirty_seconds() {
        assert_eq!(
            ChromeConfig::default().network_idle_timeout,
            Duration::from_secs(30)
        );
    }
}
