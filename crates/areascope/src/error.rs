//! Error taxonomy for acquisition, cache and configuration failures.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::Concept;

/// Closed set of acquisition failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Blocked,
    TimeoutExhausted,
    Parsing,
    Session,
    FallbackExhausted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocked => "blocked",
            Self::TimeoutExhausted => "timeout_exhausted",
            Self::Parsing => "parsing",
            Self::Session => "session",
            Self::FallbackExhausted => "fallback_exhausted",
        };
        f.write_str(name)
    }
}

/// Why a source refused us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Explicit deny (HTTP 403 or 429).
    Status(u16),
    /// Load-shedding page detected in an otherwise successful response.
    SoftBlock(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::SoftBlock(marker) => write!(f, "soft block: {marker}"),
        }
    }
}

/// One adapter's failure inside a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub adapter: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceFailure {
    pub fn new(adapter: impl Into<String>, error: &ScraperError) -> Self {
        Self {
            adapter: adapter.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Failure of a fetch, a browser session, a source adapter or a whole
/// fallback chain.
#[derive(Debug, Clone, Error)]
pub enum ScraperError {
    #[error("blocked by {url} ({reason})")]
    Blocked { url: String, reason: BlockReason },

    #[error("all {attempts} attempts failed for {url}: {last_error}")]
    TimeoutExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("unexpected {adapter} response for {key}: {reason}")]
    Parsing {
        adapter: String,
        key: String,
        reason: String,
    },

    #[error("browser session failed: {0}")]
    Session(String),

    #[error("every source for {concept} failed for {key} ({} adapters tried)", .failures.len())]
    FallbackExhausted {
        concept: Concept,
        key: String,
        failures: Vec<SourceFailure>,
    },
}

impl ScraperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Blocked { .. } => ErrorKind::Blocked,
            Self::TimeoutExhausted { .. } => ErrorKind::TimeoutExhausted,
            Self::Parsing { .. } => ErrorKind::Parsing,
            Self::Session(_) => ErrorKind::Session,
            Self::FallbackExhausted { .. } => ErrorKind::FallbackExhausted,
        }
    }

    /// Whether trying the same source again may succeed.
    ///
    /// Soft blocks are load-dependent; explicit denies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TimeoutExhausted { .. } => true,
            Self::Blocked {
                reason: BlockReason::SoftBlock(_),
                ..
            } => true,
            Self::Blocked {
                reason: BlockReason::Status(_),
                ..
            } => false,
            Self::Parsing { .. } | Self::Session(_) | Self::FallbackExhausted { .. } => false,
        }
    }

    pub fn parsing(adapter: &str, key: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Parsing {
            adapter: adapter.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// A location key that cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidKey {
    #[error("location key is empty")]
    Empty,
    #[error("location key {key:?} contains unsupported character {found:?}")]
    Character { key: String, found: char },
}

/// A cache category name that is not a lowercase slug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cache category {0:?} (expected [a-z0-9_-]+)")]
pub struct InvalidCategory(pub String);

/// Cache I/O failures. Reads never surface these; writes return them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("timed out after {waited:?} waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
