//! defectdetect CLI library
//!
//! Argument parsing, output rendering and the subcommand handlers live here so
//! that integration tests can drive them without spawning the binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

use defectdetect_core::config::DefectDetectConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Load configuration, initialise logging and dispatch the subcommand.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = DefectDetectConfig::load_or_default(&cli.config).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
        config.validate()?;
    }

    logging::init_tracing(&config.general).map_err(|e| CliError::Config(e.to_string()))?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args, &config, &writer).await,
        Commands::Invalidate(args) => commands::invalidate::execute(args, &config, &writer).await,
    }
}
