//! Scoped ownership of a single browser session.
//!
//! A manager starts its session lazily on first use and owns it until
//! `release()`. If the manager is dropped with a session still open (an
//! error path or a cancelled future), the close is spawned onto the current
//! tokio runtime; without a runtime the session is dropped and the engine
//! kills its browser process.

use areascope::{BrowserConfig, ScraperError};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{LaunchOptions, RenderSession, SessionLauncher};

/// Owns at most one live session. Not shared across concurrent scrapes.
pub struct BrowserSessionManager {
    launcher: Arc<dyn SessionLauncher>,
    config: BrowserConfig,
    session: Option<Box<dyn RenderSession>>,
    /// Sessions started over this manager's lifetime.
    launched: u32,
}

impl BrowserSessionManager {
    pub fn new(launcher: Arc<dyn SessionLauncher>, config: BrowserConfig) -> Self {
        Self {
            launcher,
            config,
            session: None,
            launched: 0,
        }
    }

    /// Return the live session, starting one if none is open.
    ///
    /// Start failures surface as `ScraperError::Session`; retrying is the
    /// caller's decision.
    pub async fn acquire(
        &mut self,
        headless: bool,
    ) -> Result<&mut Box<dyn RenderSession>, ScraperError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let options = LaunchOptions::from_config(&self.config, headless);
                let session = self.launcher.launch(&options).await.map_err(|e| match e {
                    ScraperError::Session(_) => e,
                    other => ScraperError::Session(format!("failed to start browser: {other}")),
                })?;
                self.launched += 1;
                info!(session = session.id(), headless, "browser session started");
                session
            }
        };
        Ok(self.session.insert(session))
    }

    /// Close the current session and start a brand-new one.
    pub async fn renew(
        &mut self,
        headless: bool,
    ) -> Result<&mut Box<dyn RenderSession>, ScraperError> {
        self.release().await;
        self.acquire(headless).await
    }

    /// Close the current session, if any. Close errors are logged only.
    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            let id = session.id().to_string();
            if let Err(e) = session.close().await {
                warn!(session = %id, "browser session close failed: {e}");
            }
            info!(session = %id, "browser session closed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn launched(&self) -> u32 {
        self.launched
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }
}

impl Drop for BrowserSessionManager {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let id = session.id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(session = %id, "closing abandoned browser session");
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(session = %id, "abandoned session close failed: {e}");
                    }
                });
            }
            Err(_) => {
                warn!(session = %id, "no runtime to close browser session; dropping it");
                drop(session);
            }
        }
    }
}
