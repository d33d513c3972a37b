//! Shared fakes for integration tests.

#![allow(dead_code)]

use areascope::{BlockReason, CacheStore, Concept, LocationKey, NormalizedRecord, ScraperError};
use areascope_runtime::renderer::{LaunchOptions, NavigationResult, RenderSession, SessionLauncher};
use areascope_runtime::sources::{Capability, SourceAdapter, SourceDescriptor};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn key(raw: &str) -> LocationKey {
    LocationKey::parse(raw).unwrap()
}

pub fn temp_cache() -> (tempfile::TempDir, Arc<CacheStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path(), Duration::from_secs(3600)).unwrap();
    (dir, Arc::new(store))
}

pub fn blocked() -> ScraperError {
    ScraperError::Blocked {
        url: "https://source.test".into(),
        reason: BlockReason::Status(403),
    }
}

pub fn parsing() -> ScraperError {
    ScraperError::parsing("fake", "KEY", "layout changed")
}

/// Adapter returning a fixed outcome and counting calls.
pub struct ScriptedAdapter {
    descriptor: SourceDescriptor,
    outcome: Result<NormalizedRecord, ScraperError>,
    covers: bool,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn ok(name: &str, concept: Concept, priority: u8, record: NormalizedRecord) -> Arc<Self> {
        Self::build(name, concept, priority, Ok(record), true)
    }

    pub fn failing(name: &str, concept: Concept, priority: u8, error: ScraperError) -> Arc<Self> {
        Self::build(name, concept, priority, Err(error), true)
    }

    /// Would succeed, but declares it does not cover any key.
    pub fn uncovered(
        name: &str,
        concept: Concept,
        priority: u8,
        record: NormalizedRecord,
    ) -> Arc<Self> {
        Self::build(name, concept, priority, Ok(record), false)
    }

    fn build(
        name: &str,
        concept: Concept,
        priority: u8,
        outcome: Result<NormalizedRecord, ScraperError>,
        covers: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            descriptor: SourceDescriptor::new(name, concept, Capability::Network, priority),
            outcome,
            covers,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn covers(&self, _key: &LocationKey) -> bool {
        self.covers
    }

    async fn scrape(&self, _key: &LocationKey) -> Result<NormalizedRecord, ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Pages, counters and visit log shared by a launcher and its sessions.
#[derive(Default)]
pub struct FakeBrowserState {
    pages: Mutex<VecDeque<String>>,
    launched: AtomicUsize,
    closed: AtomicUsize,
    visited: Mutex<Vec<String>>,
    navigations_per_session: Mutex<Vec<usize>>,
}

impl FakeBrowserState {
    fn next_page(&self) -> String {
        self.pages.lock().unwrap().pop_front().unwrap_or_default()
    }
}

/// Launcher whose sessions serve scripted pages, one per navigation across
/// all sessions in order. Counts launches and closes.
#[derive(Default)]
pub struct FakeLauncher {
    state: Arc<FakeBrowserState>,
}

impl FakeLauncher {
    pub fn with_pages<I, S>(pages: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let launcher = Self::default();
        *launcher.state.pages.lock().unwrap() = pages.into_iter().map(Into::into).collect();
        Arc::new(launcher)
    }

    pub fn launched(&self) -> usize {
        self.state.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.visited.lock().unwrap().clone()
    }

    /// Navigations made by each session, in launch order.
    pub fn navigations_per_session(&self) -> Vec<usize> {
        self.state.navigations_per_session.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(
        &self,
        _options: &LaunchOptions,
    ) -> Result<Box<dyn RenderSession>, ScraperError> {
        let n = self.state.launched.fetch_add(1, Ordering::SeqCst);
        self.state.navigations_per_session.lock().unwrap().push(0);
        Ok(Box::new(FakeSession {
            id: format!("fake-{n}"),
            index: n,
            state: Arc::clone(&self.state),
            html: String::new(),
        }))
    }
}

pub struct FakeSession {
    id: String,
    index: usize,
    state: Arc<FakeBrowserState>,
    html: String,
}

#[async_trait]
impl RenderSession for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(
        &mut self,
        url: &str,
        _timeout: Duration,
    ) -> Result<NavigationResult, ScraperError> {
        self.state.visited.lock().unwrap().push(url.to_string());
        self.state.navigations_per_session.lock().unwrap()[self.index] += 1;
        self.html = self.state.next_page();
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn content(&self) -> Result<String, ScraperError> {
        Ok(self.html.clone())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value, ScraperError> {
        Ok(serde_json::Value::Null)
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
