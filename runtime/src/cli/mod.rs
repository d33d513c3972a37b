//! CLI subcommand implementations for the `areascope` binary.

pub mod acquire_cmd;
pub mod cache_cmd;
pub mod doctor;
pub mod output;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `areascope=info`, or `debug` with
/// `verbose`.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default = if verbose {
        "areascope=debug,areascope_runtime=debug"
    } else {
        "areascope=info,areascope_runtime=info"
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(spec)?,
        _ => EnvFilter::try_new(default)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
