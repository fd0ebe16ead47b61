//! `defectdetect invalidate` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use defectdetect_analyzer::cache::validate_sbom_id;
use defectdetect_analyzer::{FileResultStore, ResultCache};
use defectdetect_core::config::DefectDetectConfig;

use crate::cli::InvalidateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `invalidate` command.
pub async fn execute(
    args: InvalidateArgs,
    config: &DefectDetectConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = invalidate(args, config).await?;
    writer.render(&report)?;
    Ok(())
}

/// Remove the stored result of one SBOM.
///
/// A memory store does not outlive the process, so there is nothing to remove.
pub async fn invalidate(
    args: InvalidateArgs,
    config: &DefectDetectConfig,
) -> Result<InvalidateReport, CliError> {
    validate_sbom_id(&args.sbom_id)?;

    let removed = match config.store.kind.as_str() {
        "file" => {
            let cache = ResultCache::new(FileResultStore::new(&config.store.dir));
            cache.invalidate(&args.sbom_id).await?;
            info!(sbom_id = %args.sbom_id, dir = %config.store.dir, "stored result invalidated");
            true
        }
        "memory" => false,
        other => return Err(CliError::Config(format!("unknown store kind: {other}"))),
    };

    Ok(InvalidateReport {
        sbom_id: args.sbom_id,
        store: config.store.kind.clone(),
        removed,
    })
}

#[derive(Debug, Serialize)]
pub struct InvalidateReport {
    pub sbom_id: String,
    pub store: String,
    pub removed: bool,
}

impl Render for InvalidateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.removed {
            writeln!(w, "{} {}", "Invalidated:".green().bold(), self.sbom_id)?;
        } else {
            writeln!(
                w,
                "Nothing to invalidate for {} ({} store is not persistent)",
                self.sbom_id, self.store
            )?;
        }
        Ok(())
    }
}
