//! Logging and metrics for feedrelay.
//!
//! All observability goes through `tracing`. Diagnostic records use the
//! normal levels; operator metrics (delivery counts, fallback attempts)
//! are `info` events under the [`METRIC_TARGET`] target, so a subscriber
//! can route them to a metrics sink instead of the log stream.

use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Event target under which metric events are emitted.
pub const METRIC_TARGET: &str = "feedrelay::metric";

/// Emit a named counter metric as a tracing event.
///
/// Metric events carry a `metric` field with the counter name and a
/// `value` field with the increment.
pub fn metric(name: &str, value: u64) {
    tracing::info!(target: "feedrelay::metric", metric = name, value);
}

/// Resolve the configured level, falling back to `info` on anything
/// `tracing` can't parse.
fn level_from_config(config: &LoggingConfig) -> Level {
    Level::from_str(&config.level).unwrap_or(Level::INFO)
}

/// Initialize logging with console and file output.
///
/// The console layer keeps ANSI colors; the file layer writes plain
/// records to `config.file`, creating its directory when needed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::from_default_env().add_directive(level_from_config(config).into());

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let log_file = Arc::new(File::create(&config.file)?);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(filter)
        .init();

    Ok(())
}

/// Initialize console-only logging (for development/testing).
pub fn init_console_only(level: &str) {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(filter)
        .init();
}
