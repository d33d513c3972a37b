//! Acquire feature records for one or more location keys.

use anyhow::{Context, Result};
use areascope::{AcquisitionConfig, CacheStore, LocationKey};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::output::{self, Styled};
use crate::fallback::Origin;
use crate::pipeline::{AcquisitionPipeline, PipelineOutcome};
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::{NoopLauncher, SessionLauncher};

/// Options for `areascope acquire`.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub concurrency: usize,
    pub geocode: bool,
    pub places: bool,
    pub headed: bool,
}

/// Run the standard pipeline for every key and print the results.
pub async fn run(
    config: &AcquisitionConfig,
    raw_keys: &[String],
    options: AcquireOptions,
) -> Result<()> {
    let keys = raw_keys
        .iter()
        .map(|raw| LocationKey::parse(raw).with_context(|| format!("invalid location key {raw:?}")))
        .collect::<Result<Vec<_>>>()?;

    let mut config = config.clone();
    if options.headed {
        config.browser.headless = false;
    }

    let cache = Arc::new(
        CacheStore::from_config(&config.cache)
            .with_context(|| format!("failed to open cache at {}", config.cache.root.display()))?,
    );

    let discovered = ChromiumLauncher::discover(&config.browser).await;
    let launcher: Arc<dyn SessionLauncher> = match discovered {
        Ok(launcher) => Arc::new(launcher),
        Err(e) => {
            warn!("{e}");
            warn!("running in HTTP-only mode (browser sources will fail over to cache)");
            Arc::new(NoopLauncher)
        }
    };

    let pipeline =
        AcquisitionPipeline::standard(&config, cache, launcher, options.geocode, options.places)?;
    info!("acquiring {} key(s), concurrency {}", keys.len(), options.concurrency);
    let outcomes = pipeline.run_many(&keys, options.concurrency).await;

    if output::is_json() {
        if let [single] = outcomes.as_slice() {
            output::print_json(single);
        } else {
            output::print_json(&outcomes);
        }
    } else {
        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    let s = Styled::new();
    println!("{}", s.bold(outcome.key.as_str()));
    if !output::is_quiet() {
        for concept in &outcome.concepts {
            let status = match &concept.origin {
                Some(Origin::Live { adapter }) => {
                    format!("{} {} (from {adapter})", s.ok_sym(), concept.concept)
                }
                Some(Origin::Cache { .. }) => {
                    format!("{} {} (stale cache)", s.warn_sym(), concept.concept)
                }
                None => format!(
                    "{} {} unavailable ({} source(s) failed)",
                    s.fail_sym(),
                    concept.concept,
                    concept.failures.len()
                ),
            };
            println!("  {status}");
            if output::is_verbose() {
                for failure in &concept.failures {
                    let line = format!("{}: {}", failure.adapter, failure.message);
                    println!("      {}", s.dim(&line));
                }
            }
        }
    }
    let width = outcome.features.keys().map(str::len).max().unwrap_or(0);
    for (name, value) in outcome.features.iter() {
        println!("    {name:<width$}  {}", output::format_value(value));
    }
    println!();
}
