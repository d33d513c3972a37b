//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `SessionLauncher` and `RenderSession` traits that abstract
//! over the browser engine (currently Chromium via chromiumoxide). Source
//! adapters never hold a session directly; they go through a
//! [`BrowserSessionManager`], which owns exactly one session at a time and
//! guarantees it is closed.

pub mod chromium;
pub mod session;

pub use session::BrowserSessionManager;

use areascope::{BrowserConfig, ScraperError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::stealth;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Everything a launcher needs to start one session.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub viewport: (u32, u32),
    pub page_load_timeout: Duration,
    pub chromium_path: Option<PathBuf>,
}

impl LaunchOptions {
    /// Options for a new session: the configured user-agent or a random
    /// realistic one, and a proxy drawn from the configured pool.
    pub fn from_config(config: &BrowserConfig, headless: bool) -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| stealth::random_user_agent(&mut rng).to_string());
        let proxy = stealth::pick_proxy(&mut rng, &config.proxies).map(String::from);

        Self {
            headless,
            user_agent,
            proxy,
            viewport: (config.viewport_width, config.viewport_height),
            page_load_timeout: config.page_load_timeout(),
            chromium_path: config.chromium_path.clone(),
        }
    }
}

/// A browser engine that can start isolated sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start a fresh session with no carried cookies or storage.
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn RenderSession>, ScraperError>;
}

/// A single live browser session.
#[async_trait]
pub trait RenderSession: Send + Sync {
    fn id(&self) -> &str;
    /// Navigate to a URL, failing with `TimeoutExhausted` once `timeout` elapses.
    async fn navigate(&mut self, url: &str, timeout: Duration)
        -> Result<NavigationResult, ScraperError>;
    /// Full rendered HTML of the current document.
    async fn content(&self) -> Result<String, ScraperError>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value, ScraperError>;
    /// Close the session and its browser process.
    async fn close(self: Box<Self>) -> Result<(), ScraperError>;
}

/// A launcher used when Chromium is unavailable.
///
/// Network-only adapters still work; browser adapters fail with a
/// `Session` error and the fallback chain moves on.
pub struct NoopLauncher;

#[async_trait]
impl SessionLauncher for NoopLauncher {
    async fn launch(
        &self,
        _options: &LaunchOptions,
    ) -> Result<Box<dyn RenderSession>, ScraperError> {
        Err(ScraperError::Session(
            "browser not available (HTTP-only mode)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_from_config() {
        let config = BrowserConfig {
            user_agent: Some("Fixed/1.0".into()),
            proxies: vec!["http://proxy:3128".into()],
            ..BrowserConfig::default()
        };
        let options = LaunchOptions::from_config(&config, false);
        assert!(!options.headless);
        assert_eq!(options.user_agent, "Fixed/1.0");
        assert_eq!(options.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(options.viewport, (1920, 1080));
        assert_eq!(options.page_load_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_launch_options_random_identity() {
        let options = LaunchOptions::from_config(&BrowserConfig::default(), true);
        assert!(stealth::USER_AGENTS.contains(&options.user_agent.as_str()));
        assert!(options.proxy.is_none());
    }

    #[tokio::test]
    async fn test_noop_launcher_fails_with_session_error() {
        let options = LaunchOptions::from_config(&BrowserConfig::default(), true);
        let err = NoopLauncher.launch(&options).await.err().unwrap();
        assert_eq!(err.kind(), areascope::ErrorKind::Session);
    }
}
