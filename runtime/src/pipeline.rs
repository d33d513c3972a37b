//! Multi-concept acquisition for a location key.
//!
//! One [`FallbackOrchestrator`] per concept runs concurrently; their records
//! are merged in pipeline order into a single flat [`FeatureRecord`]. A
//! concept whose chain is exhausted is logged and contributes nothing. The
//! pipeline itself never fails.

use anyhow::Result;
use areascope::{
    AcquisitionConfig, CacheStore, Concept, FeatureRecord, LocationKey, NormalizedRecord,
    ScraperError, SourceFailure,
};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::acquisition::FetchClient;
use crate::fallback::{FallbackOrchestrator, Origin};
use crate::renderer::SessionLauncher;
use crate::sources::{
    CrystalRoofReport, CrystalRoofSource, GoogleMapsPlacesSource, NomisCensusSource,
    PostcodeAreaSource, PostcodesIoSource, SourceAdapter,
};

/// Which record wins when two concepts emit the same (renamed) field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The earliest concept in pipeline order keeps the field.
    #[default]
    FirstWins,
    /// Later concepts overwrite earlier ones.
    LastWins,
}

/// Deterministic field renames applied while merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTable {
    entries: Vec<(String, String)>,
}

impl Default for RenameTable {
    fn default() -> Self {
        Self::new()
            .with("c1_c2", "c1/c2")
            .with("non_white", "non-white")
    }
}

impl RenameTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        match self.entries.iter_mut().find(|(f, _)| *f == from) {
            Some(entry) => entry.1 = to,
            None => self.entries.push((from, to)),
        }
        self
    }

    /// Output name for a canonical field.
    pub fn apply<'a>(&'a self, field: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(from, _)| from == field)
            .map_or(field, |(_, to)| to.as_str())
    }
}

/// What happened to one concept during a run.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptOutcome {
    pub concept: Concept,
    /// `None` when the concept failed.
    pub origin: Option<Origin>,
    pub fields: usize,
    /// Per-adapter failures, when the whole chain was exhausted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceFailure>,
}

impl ConceptOutcome {
    pub fn succeeded(&self) -> bool {
        self.origin.is_some()
    }
}

/// Feature record plus per-concept provenance.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub key: LocationKey,
    pub features: FeatureRecord,
    pub concepts: Vec<ConceptOutcome>,
}

/// Runs every concept's fallback chain for a key and merges the results.
pub struct AcquisitionPipeline {
    stages: Vec<FallbackOrchestrator>,
    renames: RenameTable,
    policy: MergePolicy,
}

impl AcquisitionPipeline {
    pub fn new(stages: Vec<FallbackOrchestrator>) -> Self {
        Self {
            stages,
            renames: RenameTable::default(),
            policy: MergePolicy::default(),
        }
    }

    /// The default concept set: demographics and transport, plus geocoding
    /// when `geocode` is set and nearby places when `places` is set.
    pub fn standard(
        config: &AcquisitionConfig,
        cache: Arc<CacheStore>,
        launcher: Arc<dyn SessionLauncher>,
        geocode: bool,
        places: bool,
    ) -> Result<Self> {
        // Each network adapter gets its own client so throttling is per adapter.
        let client = || FetchClient::new(config.fetch.clone());

        let demographics: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(PostcodeAreaSource::new(client()?)),
            Arc::new(NomisCensusSource::new(client()?)),
            Arc::new(CrystalRoofSource::new(
                CrystalRoofReport::Demographics,
                launcher.clone(),
                config.browser.clone(),
            )),
        ];
        let transport: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(CrystalRoofSource::new(
            CrystalRoofReport::Transport,
            launcher.clone(),
            config.browser.clone(),
        ))];

        let mut stages = vec![
            FallbackOrchestrator::new(Concept::Demographics, demographics, cache.clone()),
            FallbackOrchestrator::new(Concept::Transport, transport, cache.clone()),
        ];
        if geocode {
            let geocoding: Vec<Arc<dyn SourceAdapter>> =
                vec![Arc::new(PostcodesIoSource::new(client()?))];
            stages.push(FallbackOrchestrator::new(Concept::Geocoding, geocoding, cache.clone()));
        }
        if places {
            let places: Vec<Arc<dyn SourceAdapter>> =
                vec![Arc::new(GoogleMapsPlacesSource::new(launcher, config.browser.clone()))];
            stages.push(FallbackOrchestrator::new(Concept::Places, places, cache));
        }
        Ok(Self::new(stages))
    }

    pub fn with_renames(mut self, renames: RenameTable) -> Self {
        self.renames = renames;
        self
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn concepts(&self) -> Vec<Concept> {
        self.stages.iter().map(FallbackOrchestrator::concept).collect()
    }

    /// Acquire every concept for `key` and report per-concept outcomes.
    pub async fn run_detailed(&self, key: &LocationKey) -> PipelineOutcome {
        info!("acquiring {} concepts for {key}", self.stages.len());
        let results = join_all(self.stages.iter().map(|stage| stage.acquire(key))).await;

        let mut features = FeatureRecord::new();
        let mut concepts = Vec::with_capacity(results.len());
        for (stage, result) in self.stages.iter().zip(results) {
            let concept = stage.concept();
            match result {
                Ok(acquired) => {
                    concepts.push(ConceptOutcome {
                        concept,
                        origin: Some(acquired.origin),
                        fields: acquired.record.len(),
                        failures: Vec::new(),
                    });
                    self.merge(&mut features, acquired.record);
                }
                Err(e) => {
                    error!("{concept} unavailable for {key}: {e}");
                    let failures = match e {
                        ScraperError::FallbackExhausted { failures, .. } => failures,
                        other => vec![SourceFailure::new(concept.as_str(), &other)],
                    };
                    concepts.push(ConceptOutcome {
                        concept,
                        origin: None,
                        fields: 0,
                        failures,
                    });
                }
            }
        }

        features.insert("postcode", key.as_str());
        features.insert("outercode", key.outward());
        PipelineOutcome {
            key: key.clone(),
            features,
            concepts,
        }
    }

    /// Best-effort feature record for `key`.
    pub async fn run(&self, key: &LocationKey) -> FeatureRecord {
        self.run_detailed(key).await.features
    }

    /// Run independent keys with at most `concurrency` in flight. Results
    /// come back in input order.
    pub async fn run_many(&self, keys: &[LocationKey], concurrency: usize) -> Vec<PipelineOutcome> {
        stream::iter(keys)
            .map(|key| self.run_detailed(key))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    fn merge(&self, features: &mut FeatureRecord, record: NormalizedRecord) {
        for (field, value) in record {
            let name = self.renames.apply(&field);
            match self.policy {
                MergePolicy::FirstWins if features.contains(name) => {
                    debug!("field {name} already set by an earlier concept, keeping it");
                }
                _ => {
                    if features.insert(name, value).is_some() {
                        debug!("field {name} overwritten by a later concept");
                    }
                }
            }
        }
    }
}
