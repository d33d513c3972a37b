//! Environment readiness check.

use anyhow::Result;
use areascope::AcquisitionConfig;
use std::path::Path;

use crate::cli::output::{self, Styled};
use crate::renderer::chromium::{detect_engine_version, find_chromium};

/// Check Chromium availability and version, the cache directory and the
/// resolved configuration.
pub async fn run(config: &AcquisitionConfig) -> Result<()> {
    let chromium = find_chromium(config.browser.chromium_path.as_deref());
    let version = match &chromium {
        Some(path) => detect_engine_version(path).await,
        None => None,
    };
    let cache_ok = cache_writable(&config.cache.root);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium,
            "chromium_version": version,
            "cache_root": config.cache.root,
            "cache_writable": cache_ok,
            "ready": chromium.is_some() && cache_ok,
        }));
        return Ok(());
    }

    let s = Styled::new();
    println!("Areascope Doctor");
    println!("================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let (found, line) = chromium_status(chromium.as_deref(), version);
    let sym = match (found, version) {
        (true, Some(_)) => s.ok_sym(),
        (true, None) => s.warn_sym(),
        (false, _) => s.fail_sym(),
    };
    println!("{sym} {line}");

    if cache_ok {
        println!("{} Cache directory {} is writable", s.ok_sym(), config.cache.root.display());
    } else {
        println!(
            "{} Cache directory {} is not writable",
            s.fail_sym(),
            config.cache.root.display()
        );
    }

    println!(
        "     throttle {:.1}-{:.1}s, {} retries, timeout {}s, cache TTL {}s",
        config.fetch.min_delay_secs,
        config.fetch.max_delay_secs,
        config.fetch.max_retries,
        config.fetch.timeout_secs,
        config.cache.ttl_secs
    );
    if !config.fetch.proxies.is_empty() {
        println!("     {} proxies configured", config.fetch.proxies.len());
    }

    println!();
    if chromium.is_some() && cache_ok {
        println!("Status: READY");
    } else if cache_ok {
        println!("Status: HTTP-ONLY (browser sources unavailable)");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

/// Whether Chromium was found, and the line describing it.
fn chromium_status(path: Option<&Path>, version: Option<u32>) -> (bool, String) {
    match (path, version) {
        (Some(path), Some(v)) => (true, format!("Chromium {v} found: {}", path.display())),
        (Some(path), None) => (
            true,
            format!("Chromium found at {} (version unknown)", path.display()),
        ),
        (None, _) => (
            false,
            "Chromium NOT found. Set AREASCOPE_CHROMIUM_PATH or install Chrome.".to_string(),
        ),
    }
}

fn cache_writable(root: &Path) -> bool {
    if std::fs::create_dir_all(root).is_err() {
        return false;
    }
    let marker = root.join(".doctor-write-test");
    let ok = std::fs::write(&marker, b"ok").is_ok();
    let _ = std::fs::remove_file(&marker);
    ok
}
