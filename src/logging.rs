//! Tracing subscriber setup for applications embedding the engine.

use anyhow::Result;
use std::fs::OpenOptions;
use std::path::Path;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,mailsync=debug";

/// Install a global subscriber honoring `RUST_LOG`.
///
/// Logs go to `log_file` when it can be opened, otherwise to stderr.
/// Calling this more than once is harmless; later calls keep the first
/// subscriber.
pub fn setup_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(log_file, filter)
}

fn install(log_file: Option<&Path>, filter: EnvFilter) -> Result<()> {
    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let result = if let Some(file) = file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("Subscriber already installed: {}", e);
    }
    Ok(())
}
