//! Persistent TTL cache for acquired records.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!     demographics/
//!         SW1A_1AA.json        {"cached_at": ..., "key": "SW1A 1AA", "payload": {...}}
//!         SW1A_1AA.json.lock
//!     transport/
//!         ...
//! ```
//!
//! ## Expiry
//!
//! Entries expire lazily: a read more than `ttl` after `cached_at` behaves as
//! a miss. Nothing is deleted at read time.
//!
//! ## Failure policy
//!
//! Every entry access holds that entry's lock (see [`crate::lock`]). Lock
//! timeouts, I/O errors and undecodable files during `get` are logged and
//! reported as a miss. `set` returns the error after logging it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::lock::EntryLock;
use crate::types::{Category, LocationKey};

/// File extension of entry files.
const ENTRY_EXT: &str = "json";

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    cached_at: f64,
    key: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    cached_at: f64,
    #[allow(dead_code)]
    key: String,
    payload: T,
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Lock-protected file cache keyed by (category, location key).
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Base directory for category subdirectories.
    root: PathBuf,
    /// Entry time-to-live.
    ttl: Duration,
    /// Maximum wait for a single entry lock.
    lock_timeout: Duration,
}

impl CacheStore {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self, CacheError> {
        let root = root.into();
        for category in Category::KNOWN {
            fs::create_dir_all(root.join(category.as_str()))?;
        }
        debug!("cache opened at {} (ttl {:?})", root.display(), ttl);

        Ok(Self {
            root,
            ttl,
            lock_timeout: Duration::from_secs(5),
        })
    }

    /// Open the cache described by `config`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self::open(&config.root, config.ttl())?.with_lock_timeout(config.lock_timeout()))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the entry file for (category, key).
    pub fn entry_path(&self, category: &Category, key: &LocationKey) -> PathBuf {
        self.root
            .join(category.as_str())
            .join(format!("{}.{ENTRY_EXT}", key.cache_stem()))
    }

    /// Fetch a live entry's payload, or `None` if absent, expired or
    /// unreadable.
    pub fn get<T: DeserializeOwned>(&self, category: &Category, key: &LocationKey) -> Option<T> {
        let path = self.entry_path(category, key);
        if !path.exists() {
            return None;
        }

        let read = || -> Result<Envelope<T>, CacheError> {
            let _lock = EntryLock::acquire(&path, self.lock_timeout)?;
            let bytes = fs::read(&path)?;
            Ok(serde_json::from_slice(&bytes)?)
        };

        match read() {
            Ok(envelope) => {
                if self.is_expired(envelope.cached_at) {
                    debug!("cache expired for {category}/{key}");
                    return None;
                }
                Some(envelope.payload)
            }
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("cache read error for {category}/{key}: {e}");
                None
            }
        }
    }

    /// Write (overwriting) the entry for (category, key), stamped now.
    pub fn set<T: Serialize>(
        &self,
        category: &Category,
        key: &LocationKey,
        payload: &T,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(category, key);
        let result = self.write_entry(&path, key, payload);
        match &result {
            Ok(()) => debug!("cached {category} data for {key}"),
            Err(e) => error!("cache write error for {category}/{key}: {e}"),
        }
        result
    }

    fn write_entry<T: Serialize>(
        &self,
        path: &Path,
        key: &LocationKey,
        payload: &T,
    ) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&EnvelopeRef {
            cached_at: unix_now(),
            key: key.as_str(),
            payload,
        })?;

        let _lock = EntryLock::acquire(path, self.lock_timeout)?;

        // Write beside the entry and rename so readers never see a torn file.
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Whether a live (non-expired) entry exists.
    pub fn has(&self, category: &Category, key: &LocationKey) -> bool {
        self.get::<serde_json::Value>(category, key).is_some()
    }

    /// Remove one entry. Returns `true` if it existed.
    pub fn invalidate(&self, category: &Category, key: &LocationKey) -> bool {
        let path = self.entry_path(category, key);
        if !path.exists() {
            return false;
        }
        let removed = EntryLock::acquire(&path, self.lock_timeout)
            .and_then(|_lock| fs::remove_file(&path).map_err(CacheError::from));
        match removed {
            Ok(()) => {
                debug!("invalidated cache for {category}/{key}");
                true
            }
            Err(e) => {
                warn!("failed to invalidate {category}/{key}: {e}");
                false
            }
        }
    }

    /// Remove every entry in `category`, or in all categories when `None`.
    /// Returns the number of entries removed.
    ///
    /// Each entry is removed under its lock; an entry whose lock cannot be
    /// taken in time is skipped. Lock markers stay: unlinking one would let
    /// a waiter and a newcomer lock different files for the same entry.
    pub fn clear(&self, category: Option<&Category>) -> usize {
        let dirs: Vec<PathBuf> = match category {
            Some(c) => vec![self.root.join(c.as_str())],
            None => self.category_dirs().into_iter().map(|(_, dir)| dir).collect(),
        };

        let mut count = 0;
        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                    continue;
                }
                let removed = EntryLock::acquire(&path, self.lock_timeout)
                    .and_then(|_lock| fs::remove_file(&path).map_err(CacheError::from));
                match removed {
                    Ok(()) => count += 1,
                    Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("failed to clear {}: {e}", path.display()),
                }
            }
        }

        info!("cleared {count} cache entries");
        count
    }

    /// Entry count per existing category directory.
    pub fn stats(&self) -> BTreeMap<Category, usize> {
        self.category_dirs()
            .into_iter()
            .map(|(category, dir)| {
                let count = fs::read_dir(&dir)
                    .map(|entries| {
                        entries
                            .flatten()
                            .filter(|e| {
                                e.path().extension().and_then(|x| x.to_str()) == Some(ENTRY_EXT)
                            })
                            .count()
                    })
                    .unwrap_or(0);
                (category, count)
            })
            .collect()
    }

    fn category_dirs(&self) -> Vec<(Category, PathBuf)> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| {
                let name = e.file_name();
                let category = Category::new(name.to_str()?).ok()?;
                Some((category, e.path()))
            })
            .collect()
    }

    fn is_expired(&self, cached_at: f64) -> bool {
        unix_now() - cached_at > self.ttl.as_secs_f64()
    }
}
