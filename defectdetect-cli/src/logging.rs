//! Tracing subscriber setup for the CLI.
//!
//! Log lines always go to stderr; stdout is reserved for the rendered report
//! so that `--output json` can be piped.

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use defectdetect_core::config::GeneralConfig;

/// Install the global subscriber from the `[general]` section.
///
/// `RUST_LOG` wins over `general.log_level` when set. `general.log_format`
/// selects JSON lines (`json`) or multi-line human output (`pretty`).
///
/// # Errors
///
/// Fails on an unknown format or when a subscriber is already installed.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (json, pretty) = match config.log_format.as_str() {
        "json" => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        "pretty" => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            ),
        ),
        other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .context("failed to install tracing subscriber")
}
