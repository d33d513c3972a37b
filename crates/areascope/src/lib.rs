//! Areascope: per-location area data acquisition.
//!
//! This crate holds the storage and data model shared by the acquisition
//! runtime: normalized location keys, canonical per-concept records, the
//! error taxonomy, configuration, and the lock-protected TTL cache.

pub mod cache;
pub mod config;
pub mod error;
mod lock;
pub mod normalize;
pub mod types;

pub use cache::CacheStore;
pub use config::{AcquisitionConfig, BrowserConfig, CacheConfig, FetchConfig};
pub use error::{
    BlockReason, CacheError, ConfigError, ErrorKind, InvalidCategory, InvalidKey, ScraperError,
    SourceFailure,
};
pub use types::{
    Category, Concept, FeatureRecord, FieldKind, FieldSpec, FieldValue, LocationKey,
    NormalizedRecord, NOT_AVAILABLE,
};
