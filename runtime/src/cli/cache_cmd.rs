//! Inspect and manage the on-disk cache.

use anyhow::{bail, Context, Result};
use areascope::{AcquisitionConfig, CacheStore, Category, LocationKey};

use crate::cli::output::{self, Styled};

fn open(config: &AcquisitionConfig) -> Result<CacheStore> {
    CacheStore::from_config(&config.cache)
        .with_context(|| format!("failed to open cache at {}", config.cache.root.display()))
}

fn category(raw: &str) -> Result<Category> {
    raw.parse::<Category>().map_err(anyhow::Error::from)
}

fn key(raw: &str) -> Result<LocationKey> {
    LocationKey::parse(raw).with_context(|| format!("invalid location key {raw:?}"))
}

/// Entry counts per category.
pub async fn run_stats(config: &AcquisitionConfig) -> Result<()> {
    let cache = open(config)?;
    let stats = cache.stats();
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "root": cache.root(),
            "ttl_secs": cache.ttl().as_secs(),
            "categories": stats,
        }));
        return Ok(());
    }

    println!("Cache: {}", cache.root().display());
    println!("TTL:   {}s", cache.ttl().as_secs());
    println!();
    for (category, count) in &stats {
        println!("  {:<14} {count}", category.as_str());
    }
    println!("  {:<14} {}", "total", stats.values().sum::<usize>());
    Ok(())
}

/// Remove all entries, or those of one category.
pub async fn run_clear(config: &AcquisitionConfig, raw_category: Option<&str>) -> Result<()> {
    let cache = open(config)?;
    let category = raw_category.map(category).transpose()?;
    let removed = cache.clear(category.as_ref());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "category": category,
            "removed": removed,
        }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        match &category {
            Some(c) => eprintln!("  {} Removed {removed} {c} entries.", s.ok_sym()),
            None => eprintln!("  {} Removed {removed} entries.", s.ok_sym()),
        }
    }
    Ok(())
}

/// Remove a single entry.
pub async fn run_invalidate(
    config: &AcquisitionConfig,
    raw_category: &str,
    raw_key: &str,
) -> Result<()> {
    let cache = open(config)?;
    let category = category(raw_category)?;
    let key = key(raw_key)?;
    let removed = cache.invalidate(&category, &key);

    if output::is_json() {
        output::print_json(&serde_json::json!({ "removed": removed }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        if removed {
            eprintln!("  {} Invalidated {category}/{key}.", s.ok_sym());
        } else {
            eprintln!("  {} No entry for {category}/{key}.", s.warn_sym());
        }
    }
    Ok(())
}

/// Print a live entry's payload.
pub async fn run_get(config: &AcquisitionConfig, raw_category: &str, raw_key: &str) -> Result<()> {
    let cache = open(config)?;
    let category = category(raw_category)?;
    let key = key(raw_key)?;
    match cache.get::<serde_json::Value>(&category, &key) {
        Some(payload) => {
            output::print_json(&payload);
            Ok(())
        }
        None => bail!("no live cache entry for {category}/{key}"),
    }
}
