//! Per-concept fallback chain over source adapters, ending at the cache.
//!
//! ```text
//! TryLive(i) ── ok ──▶ WriteCache ──▶ Done(live)
//!     │ err / skipped
//!     ▼
//! TryLive(i+1) … ──▶ TryCache ── hit ──▶ Done(stale)
//!                        └────── miss ─▶ Fail(FallbackExhausted)
//! ```
//!
//! Adapter errors never escape this module except folded into the final
//! `FallbackExhausted`. Cache I/O runs on the blocking pool and only ever
//! degrades to a miss.

use areascope::{CacheStore, Concept, LocationKey, NormalizedRecord, ScraperError, SourceFailure};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::sources::SourceAdapter;

/// Where an acquired record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Origin {
    /// Fresh from the named adapter.
    Live { adapter: String },
    /// Served from the cache after every adapter failed.
    Cache { stale: bool },
}

/// A record plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    pub record: NormalizedRecord,
    pub origin: Origin,
}

enum State {
    TryLive(usize),
    WriteCache {
        record: NormalizedRecord,
        adapter: String,
    },
    TryCache,
    Done(Acquired),
    Fail,
}

/// Ordered adapters for one concept, with the cache as terminal source.
pub struct FallbackOrchestrator {
    concept: Concept,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    cache: Arc<CacheStore>,
    deadline: Option<Duration>,
}

impl FallbackOrchestrator {
    /// Adapters are tried in ascending priority; equal priorities keep
    /// the order given.
    pub fn new(
        concept: Concept,
        mut adapters: Vec<Arc<dyn SourceAdapter>>,
        cache: Arc<CacheStore>,
    ) -> Self {
        adapters.sort_by_key(|a| a.descriptor().priority);
        for adapter in &adapters {
            if adapter.descriptor().concept != concept {
                warn!(
                    "adapter {} serves {} but was registered for {concept}",
                    adapter.name(),
                    adapter.descriptor().concept
                );
            }
        }
        Self {
            concept,
            adapters,
            cache,
            deadline: None,
        }
    }

    /// Wall-clock budget for the live part of the chain. Expiry counts as a
    /// `TimeoutExhausted` failure and falls through to the cache.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn concept(&self) -> Concept {
        self.concept
    }

    /// Adapter names in the order they are tried.
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// The record for `key`, or `FallbackExhausted` when every adapter and
    /// the cache failed.
    pub async fn scrape_with_fallback(
        &self,
        key: &LocationKey,
    ) -> Result<NormalizedRecord, ScraperError> {
        self.acquire(key).await.map(|acquired| acquired.record)
    }

    /// Like [`scrape_with_fallback`](Self::scrape_with_fallback), also
    /// reporting where the record came from.
    pub async fn acquire(&self, key: &LocationKey) -> Result<Acquired, ScraperError> {
        let started = Instant::now();
        let mut failures: Vec<SourceFailure> = Vec::new();
        let mut state = State::TryLive(0);

        loop {
            state = match state {
                State::TryLive(i) if i >= self.adapters.len() => State::TryCache,
                State::TryLive(i) => {
                    let adapter = &self.adapters[i];
                    if !adapter.covers(key) {
                        debug!("{} does not cover {key}, skipping", adapter.name());
                        State::TryLive(i + 1)
                    } else {
                        match self.try_live(adapter.as_ref(), key, started).await {
                            Ok(record) => State::WriteCache {
                                record,
                                adapter: adapter.name().to_string(),
                            },
                            Err(e) => {
                                warn!(
                                    "{} failed for {key} ({}): {e}",
                                    adapter.name(),
                                    self.concept
                                );
                                let expired = self.expired(started);
                                failures.push(SourceFailure::new(adapter.name(), &e));
                                if expired {
                                    State::TryCache
                                } else {
                                    State::TryLive(i + 1)
                                }
                            }
                        }
                    }
                }
                State::WriteCache { record, adapter } => {
                    self.write_cache(key, &record).await;
                    info!("{} for {key} acquired from {adapter}", self.concept);
                    State::Done(Acquired {
                        record,
                        origin: Origin::Live { adapter },
                    })
                }
                State::TryCache => match self.read_cache(key).await {
                    Some(record) => {
                        warn!(
                            "all live sources failed for {key} ({}), serving cached data",
                            self.concept
                        );
                        State::Done(Acquired {
                            record,
                            origin: Origin::Cache { stale: true },
                        })
                    }
                    None => State::Fail,
                },
                State::Done(acquired) => return Ok(acquired),
                State::Fail => {
                    return Err(ScraperError::FallbackExhausted {
                        concept: self.concept,
                        key: key.to_string(),
                        failures,
                    })
                }
            };
        }
    }

    fn expired(&self, started: Instant) -> bool {
        self.deadline.is_some_and(|d| started.elapsed() >= d)
    }

    async fn try_live(
        &self,
        adapter: &dyn SourceAdapter,
        key: &LocationKey,
        started: Instant,
    ) -> Result<NormalizedRecord, ScraperError> {
        let Some(deadline) = self.deadline else {
            return adapter.scrape(key).await;
        };
        let remaining = deadline.saturating_sub(started.elapsed());
        let timed_out = || ScraperError::TimeoutExhausted {
            url: adapter.name().to_string(),
            attempts: 1,
            last_error: format!("deadline of {}ms elapsed", deadline.as_millis()),
        };
        if remaining.is_zero() {
            return Err(timed_out());
        }
        tokio::time::timeout(remaining, adapter.scrape(key))
            .await
            .unwrap_or_else(|_| Err(timed_out()))
    }

    async fn read_cache(&self, key: &LocationKey) -> Option<NormalizedRecord> {
        let cache = self.cache.clone();
        let category = self.concept.category();
        let key = key.clone();
        tokio::task::spawn_blocking(move || cache.get::<NormalizedRecord>(&category, &key))
            .await
            .unwrap_or_default()
    }

    async fn write_cache(&self, key: &LocationKey, record: &NormalizedRecord) {
        let cache = self.cache.clone();
        let category = self.concept.category();
        let key = key.clone();
        let record = record.clone();
        // Errors are logged by the store; the live result is returned anyway.
        let write = move || cache.set(&category, &key, &record);
        if let Err(e) = tokio::task::spawn_blocking(write).await {
            warn!("cache write task failed: {e}");
        }
    }
}
