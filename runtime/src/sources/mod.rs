//! Source adapters: one per external data source.
//!
//! Every adapter turns a location key into a [`NormalizedRecord`] for one
//! concept, or a classified [`ScraperError`]. The fallback orchestrator only
//! ever sees the [`SourceAdapter`] trait; how a source is fetched (plain
//! HTTP or a rendered browser session) and how its markup is read stays
//! behind it.

pub mod coverage;
pub mod crystalroof;
pub mod doogal;
pub mod google_maps;
pub mod nomis;
pub mod postcodearea;
pub mod postcodes_io;

pub use coverage::CoverageTable;
pub use crystalroof::{CrystalRoofReport, CrystalRoofSource};
pub use google_maps::{GoogleMapsPlacesSource, PlaceCategory};
pub use nomis::NomisCensusSource;
pub use postcodearea::PostcodeAreaSource;
pub use postcodes_io::PostcodesIoSource;

use areascope::{Concept, LocationKey, NormalizedRecord, ScraperError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// How an adapter reaches its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Network,
    Browser,
}

/// Static description of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub concept: Concept,
    pub capability: Capability,
    /// Lower runs first within a concept.
    pub priority: u8,
}

impl SourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        concept: Concept,
        capability: Capability,
        priority: u8,
    ) -> Self {
        Self {
            name: name.into(),
            concept,
            capability,
            priority,
        }
    }
}

/// A single external source for one concept.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Whether this source returns trustworthy data for `key`.
    ///
    /// Sources that silently answer for the wrong area on unknown keys
    /// return `false` so the orchestrator skips them.
    fn covers(&self, _key: &LocationKey) -> bool {
        true
    }

    /// Fetch and normalize the record for `key`.
    ///
    /// Fails with `Blocked`, `TimeoutExhausted`, `Parsing` or `Session`.
    async fn scrape(&self, key: &LocationKey) -> Result<NormalizedRecord, ScraperError>;
}

/// Retry schedule for load-shedding pages.
///
/// Tuned against one source whose block rate is stochastic; other adapters
/// should set their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftBlockPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub spacing: Duration,
}

impl Default for SoftBlockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            spacing: Duration::from_secs(10),
        }
    }
}

/// `base` joined with `path`, without doubled slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Whitespace-normalized text of a whole document.
pub(crate) fn document_text(html: &scraper::Html) -> String {
    let raw = html.root_element().text().collect::<Vec<_>>().join(" ");
    areascope::normalize::clean_text(&raw)
}
