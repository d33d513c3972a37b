//! Configuration loading and resolution.
//!
//! A single [`AcquisitionConfig`] value is built at startup (defaults, then an
//! optional TOML file, then `AREASCOPE_*` environment overrides) and handed
//! to each component's constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "areascope.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub fetch: FetchConfig,
    pub browser: BrowserConfig,
    pub cache: CacheConfig,
}

/// Fetch client throttling, retry and transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Lower bound of the randomized pre-request delay, seconds.
    pub min_delay_secs: f64,
    /// Upper bound of the randomized pre-request delay, seconds.
    pub max_delay_secs: f64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Exponential backoff base: attempt `n` waits `base^n` seconds plus jitter.
    pub backoff_base: f64,
    /// Upper bound of the uniform jitter added to each backoff, seconds.
    pub jitter_secs: f64,
    pub proxies: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 2.0,
            max_delay_secs: 8.0,
            max_retries: 3,
            timeout_secs: 30,
            backoff_base: 2.0,
            jitter_secs: 1.0,
            proxies: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject throttle and backoff settings the fetch client cannot turn
    /// into sleeps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timings = [
            ("min_delay_secs", self.min_delay_secs),
            ("max_delay_secs", self.max_delay_secs),
            ("backoff_base", self.backoff_base),
            ("jitter_secs", self.jitter_secs),
        ];
        for (name, value) in timings {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.min_delay_secs > self.max_delay_secs {
            return Err(ConfigError::Invalid(format!(
                "min_delay_secs ({}) exceeds max_delay_secs ({})",
                self.min_delay_secs, self.max_delay_secs
            )));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// No throttling and no backoff, for tests and local replay.
    pub fn immediate() -> Self {
        Self {
            min_delay_secs: 0.0,
            max_delay_secs: 0.0,
            backoff_base: 0.0,
            jitter_secs: 0.0,
            timeout_secs: 5,
            ..Self::default()
        }
    }
}

/// Headless browser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub page_load_timeout_secs: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Fixed user agent; a realistic one is drawn per session when unset.
    pub user_agent: Option<String>,
    pub chromium_path: Option<PathBuf>,
    pub proxies: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout_secs: 60,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: None,
            chromium_path: None,
            proxies: Vec::new(),
        }
    }
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

/// Cache location and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub ttl_secs: u64,
    pub lock_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/cache"),
            ttl_secs: 86_400 * 30,
            lock_timeout_ms: 5_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl AcquisitionConfig {
    /// Resolve the full configuration.
    ///
    /// Uses `explicit` when given, otherwise `areascope.toml` in the working
    /// directory if present, then applies environment overrides and
    /// validates the result.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::from_file(&local)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing sections keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `AREASCOPE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "AREASCOPE_MIN_DELAY")? {
            self.fetch.min_delay_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "AREASCOPE_MAX_DELAY")? {
            self.fetch.max_delay_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "AREASCOPE_MAX_RETRIES")? {
            self.fetch.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "AREASCOPE_TIMEOUT")? {
            self.fetch.timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "AREASCOPE_HEADLESS")? {
            self.browser.headless = v;
        }
        if let Some(raw) = lookup("AREASCOPE_PROXIES") {
            let proxies = split_list(&raw);
            self.fetch.proxies = proxies.clone();
            self.browser.proxies = proxies;
        }
        if let Some(path) = lookup("AREASCOPE_CHROMIUM_PATH").filter(|p| !p.trim().is_empty()) {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("AREASCOPE_CACHE_DIR").filter(|p| !p.trim().is_empty()) {
            self.cache.root = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&lookup, "AREASCOPE_CACHE_TTL")? {
            self.cache.ttl_secs = v;
        }
        Ok(())
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fetch.validate()?;
        let mut proxies = self.fetch.proxies.iter().chain(self.browser.proxies.iter());
        if proxies.any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid("proxy entries must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value: raw,
            }),
    }
}

/// Comma-separated list with blank entries dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
