//! Chromium-based session launcher using chromiumoxide.

use super::{LaunchOptions, NavigationResult, RenderSession, SessionLauncher};
use areascope::{BrowserConfig, ScraperError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as EngineConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stealth;

/// Find the Chromium binary path.
///
/// Order: the configured path, `AREASCOPE_CHROMIUM_PATH`, `~/.areascope/chromium/`,
/// then `google-chrome`, `chromium` and `chromium-browser` on `PATH`, then the
/// standard macOS install.
pub fn find_chromium(configured: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(path) = configured.filter(|p| p.exists()) {
        return Some(path.to_path_buf());
    }
    if let Ok(p) = std::env::var("AREASCOPE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.areascope/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".areascope/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".areascope/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".areascope/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".areascope/chromium/chrome-linux64/chrome"),
                home.join(".areascope/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Extract the major version from `chrome --version` output.
pub fn parse_major_version(output: &str) -> Option<u32> {
    let re = Regex::new(r"(\d+)\.").expect("version regex is valid");
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

/// Best-effort engine version detection. Failure is logged and ignored.
pub async fn detect_engine_version(executable: &Path) -> Option<u32> {
    let output = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(executable)
            .arg("--version")
            .output(),
    )
    .await;

    match output {
        Ok(Ok(out)) if out.status.success() => {
            let version = parse_major_version(&String::from_utf8_lossy(&out.stdout));
            if version.is_none() {
                warn!("could not parse browser version from {}", executable.display());
            }
            version
        }
        Ok(Ok(out)) => {
            warn!("{} --version exited with {}", executable.display(), out.status);
            None
        }
        Ok(Err(e)) => {
            warn!("failed to run {} --version: {e}", executable.display());
            None
        }
        Err(_) => {
            warn!("{} --version timed out", executable.display());
            None
        }
    }
}

/// Launches one Chromium process per session.
pub struct ChromiumLauncher {
    executable: PathBuf,
    engine_version: Option<u32>,
}

impl ChromiumLauncher {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            engine_version: None,
        }
    }

    /// Locate Chromium and detect its version.
    pub async fn discover(config: &BrowserConfig) -> Result<Self, ScraperError> {
        let executable = find_chromium(config.chromium_path.as_deref()).ok_or_else(|| {
            ScraperError::Session(
                "Chromium not found. Set AREASCOPE_CHROMIUM_PATH or install Chrome.".into(),
            )
        })?;
        let engine_version = detect_engine_version(&executable).await;
        info!(
            "using Chromium at {} (version {})",
            executable.display(),
            engine_version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
        );
        Ok(Self {
            executable,
            engine_version,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn engine_version(&self) -> Option<u32> {
        self.engine_version
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn RenderSession>, ScraperError> {
        let (width, height) = options.viewport;
        let mut builder = EngineConfig::builder()
            .chrome_executable(
                options
                    .chromium_path
                    .as_deref()
                    .unwrap_or(self.executable.as_path()),
            )
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .request_timeout(options.page_load_timeout)
            .args(stealth::browser_args(&options.user_agent, options.proxy.as_deref()));
        builder = if options.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| ScraperError::Session(format!("failed to build browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::Session(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match open_stealth_page(&browser, &options.user_agent).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(e);
            }
        };

        Ok(Box::new(ChromiumSession {
            id: format!("chromium-{}", uuid::Uuid::new_v4()),
            browser,
            page,
            handler,
        }))
    }
}

async fn open_stealth_page(browser: &Browser, user_agent: &str) -> Result<Page, ScraperError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| ScraperError::Session(format!("failed to create new page: {e}")))?;
    // Masks navigator.webdriver and friends before any document script runs.
    page.enable_stealth_mode_with_agent(user_agent)
        .await
        .map_err(|e| ScraperError::Session(format!("failed to enable stealth mode: {e}")))?;
    Ok(page)
}

/// A single Chromium process with one page.
pub struct ChromiumSession {
    id: String,
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

#[async_trait]
impl RenderSession for ChromiumSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationResult, ScraperError> {
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());
                debug!("loaded {final_url} in {load_time_ms}ms");
                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(ScraperError::Session(format!("navigation to {url} failed: {e}"))),
            Err(_) => Err(ScraperError::TimeoutExhausted {
                url: url.to_string(),
                attempts: 1,
                last_error: format!("navigation timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.page
            .content()
            .await
            .map_err(|e| ScraperError::Session(format!("failed to read page content: {e}")))
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value, ScraperError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ScraperError::Session(format!("JS execution failed: {e}")))?;
        result
            .into_value()
            .map_err(|e| ScraperError::Session(format!("failed to convert JS result: {e:?}")))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        let Self {
            mut browser,
            page,
            handler,
            ..
        } = *self;
        let _ = page.close().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        closed
            .map(|_| ())
            .map_err(|e| ScraperError::Session(format!("failed to close browser: {e}")))
    }
}
