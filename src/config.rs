use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::browser::chrome::ChromeConfig;

/// Seconds between polls when WEIBO_POLL_INTERVAL_SECS is unset.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Seconds to wait for network idle when NETWORK_IDLE_TIMEOUT_SECS is unset.
pub const DEFAULT_NETWORK_IDLE_TIMEOUT_SECS: u64 = 30;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Profile id of the account to watch
    pub weibo_uid: String,
    /// Notification delivery endpoint
    pub api_url: String,
    /// Optional credential sent with every delivery
    pub api_key: Option<String>,
    pub poll_interval: Duration,
    pub network_idle_timeout: Duration,
    /// Browser binary to launch (auto-detected when unset)
    pub chrome_executable: Option<PathBuf>,
    /// DevTools endpoint of an already running browser. When set, the watcher
    /// borrows that browser instead of launching one.
    pub chrome_cdp_url: Option<String>,
    pub headful: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_interval = secs(get("WEIBO_POLL_INTERVAL_SECS"), DEFAULT_POLL_INTERVAL_SECS)
            .context("WEIBO_POLL_INTERVAL_SECS must be a whole number of seconds")?;
        let network_idle_timeout = secs(
            get("NETWORK_IDLE_TIMEOUT_SECS"),
            DEFAULT_NETWORK_IDLE_TIMEOUT_SECS,
        )
        .context("NETWORK_IDLE_TIMEOUT_SECS must be a whole number of seconds")?;

        let headful = matches!(
            get("CHROME_HEADFUL").as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "yes")
        );

        Ok(Self {
            weibo_uid: get("WEIBO_UID").unwrap_or_default(),
            api_url: get("API_URL").unwrap_or_default(),
            api_key: get("API_KEY"),
            poll_interval,
            network_idle_timeout,
            chrome_executable: get("CHROME_EXECUTABLE").map(PathBuf::from),
            chrome_cdp_url: get("CHROME_CDP_URL"),
            headful,
        })
    }

    /// Check that there is an account to watch.
    pub fn require_uid(&self) -> Result<()> {
        if self.weibo_uid.is_empty() {
            anyhow::bail!(
                "WEIBO_UID not set. Add it to your .env file or pass --uid.\n\
                 See .env.example for the required variables."
            );
        }
        if !self.weibo_uid.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("WEIBO_UID must be numeric, got {:?}", self.weibo_uid);
        }
        Ok(())
    }

    /// Check that notifications have somewhere to go.
    pub fn require_delivery(&self) -> Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!(
                "API_URL not set. Add it to your .env file, or run with --dry-run.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }

    /// Launch options for a locally started browser.
    pub fn chrome(&self) -> ChromeConfig {
        ChromeConfig {
            executable: self.chrome_executable.clone(),
            headful: self.headful,
            network_idle_timeout: self.network_idle_timeout,
        }
    }
}

fn secs(value: Option<String>, default: u64) -> Result<Duration> {
    match value {
        Some(v) => Ok(Duration::from_secs(v.trim().parse()?)),
        None => Ok(Duration::from_secs(default)),
    }
}
