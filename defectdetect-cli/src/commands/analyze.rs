//! `defectdetect analyze` command handler

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use defectdetect_analyzer::{
    AnalysisResult, AnalyzerConfig, FileResultStore, MatchConfidence, MemoryResultStore,
    OsvSource, RawComponent, ResultOrigin, ResultStore, StaticSource, VulnerabilityAnalyzer,
    VulnerabilitySource,
};
use defectdetect_core::config::DefectDetectConfig;
use defectdetect_core::types::Severity;

use crate::cli::AnalyzeArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `analyze` command.
///
/// Renders the report, then maps it to an exit status with
/// [`AnalyzeReport::verdict`].
pub async fn execute(
    args: AnalyzeArgs,
    config: &DefectDetectConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = analyze(args, config).await?;
    writer.render(&report)?;
    report.verdict()
}

/// Run one analysis and build the report payload without rendering it.
pub async fn analyze(
    args: AnalyzeArgs,
    config: &DefectDetectConfig,
) -> Result<AnalyzeReport, CliError> {
    let components = read_components(&args.components).await?;
    let analyzer_config = AnalyzerConfig::from_core(&config.analysis);

    let request = Request {
        sbom_id: args.sbom_id,
        freshness: args
            .freshness_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| analyzer_config.default_freshness()),
        deadline: args.deadline_secs.map(Duration::from_secs),
        components,
    };

    info!(
        sbom_id = %request.sbom_id,
        components = request.components.len(),
        freshness_secs = request.freshness.as_secs(),
        "starting analysis"
    );

    let static_db = args.offline_db.or_else(|| {
        (config.source.kind == "static").then(|| config.source.static_db_path.clone().into())
    });

    match static_db {
        Some(dir) => {
            let source = tokio::task::spawn_blocking(move || StaticSource::load_from_dir(&dir))
                .await
                .map_err(|e| CliError::Command(format!("vulnerability db loader failed: {e}")))??;
            info!(entries = source.entry_count(), "offline vulnerability db loaded");
            with_store(analyzer_config, source, config, request).await
        }
        None => {
            let source =
                OsvSource::new(config.source.osv_url.clone(), analyzer_config.query_timeout())?;
            with_store(analyzer_config, source, config, request).await
        }
    }
}

struct Request {
    sbom_id: String,
    freshness: Duration,
    deadline: Option<Duration>,
    components: Vec<RawComponent>,
}

async fn with_store<S: VulnerabilitySource>(
    analyzer_config: AnalyzerConfig,
    source: S,
    config: &DefectDetectConfig,
    request: Request,
) -> Result<AnalyzeReport, CliError> {
    match config.store.kind.as_str() {
        "memory" => run(analyzer_config, source, MemoryResultStore::new(), request).await,
        "file" => {
            let store = FileResultStore::new(&config.store.dir);
            run(analyzer_config, source, store, request).await
        }
        other => Err(CliError::Config(format!("unknown store kind: {other}"))),
    }
}

async fn run<S: VulnerabilitySource, R: ResultStore>(
    analyzer_config: AnalyzerConfig,
    source: S,
    store: R,
    request: Request,
) -> Result<AnalyzeReport, CliError> {
    let analyzer = VulnerabilityAnalyzer::new(analyzer_config, source, store)?;

    let report = match request.deadline {
        Some(deadline) => {
            analyzer
                .analyze_with_deadline(
                    &request.sbom_id,
                    &request.components,
                    request.freshness,
                    deadline,
                )
                .await?
        }
        None => {
            analyzer
                .analyze(&request.sbom_id, &request.components, request.freshness)
                .await?
        }
    };

    if let Some(warning) = &report.cache_warning {
        tracing::warn!(sbom_id = %request.sbom_id, error = %warning, "result was not persisted");
    }

    Ok(AnalyzeReport {
        origin: report.origin,
        cache_warning: report.cache_warning.map(|e| e.to_string()),
        result: AnalysisResult::clone(&report.result),
    })
}

/// Accepted shapes of the component list file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ComponentFile {
    List(Vec<RawComponent>),
    Document { components: Vec<RawComponent> },
}

impl ComponentFile {
    fn into_components(self) -> Vec<RawComponent> {
        match self {
            Self::List(components) | Self::Document { components } => components,
        }
    }
}

async fn read_components(path: &Path) -> Result<Vec<RawComponent>, CliError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_components(&content)
}

fn parse_components(content: &str) -> Result<Vec<RawComponent>, CliError> {
    serde_json::from_str::<ComponentFile>(content)
        .map(ComponentFile::into_components)
        .map_err(|e| CliError::Input(e.to_string()))
}

#[derive(Debug, Serialize)]
pub struct AnalyzeReport {
    pub origin: ResultOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_warning: Option<String>,
    pub result: AnalysisResult,
}

impl AnalyzeReport {
    /// Exit status of the report.
    ///
    /// Matched vulnerabilities win (`CliError::Vulnerable`, exit 4). Otherwise
    /// any component that could not be assessed yields `CliError::Incomplete`
    /// (exit 6), so a partial answer never exits 0.
    pub fn verdict(&self) -> Result<(), CliError> {
        let count = self.result.severity_summary.total();
        if count > 0 {
            return Err(CliError::Vulnerable { count });
        }
        let unknown = self.result.unknown_count();
        if unknown > 0 {
            return Err(CliError::Incomplete { unknown });
        }
        Ok(())
    }
}

impl Render for AnalyzeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let result = &self.result;
        writeln!(w, "SBOM: {}", result.sbom_id.bold())?;
        writeln!(
            w,
            "Analysis: {} ({})",
            result.analysis_id,
            self.origin.as_str().to_lowercase()
        )?;
        writeln!(
            w,
            "Components: {} unique ({} entries)",
            result.findings.len(),
            result.total_entries
        )?;

        if let Some(warning) = &self.cache_warning {
            writeln!(w, "{} {}", "warning:".yellow().bold(), warning)?;
        }
        writeln!(w)?;

        let summary = &result.severity_summary;
        let summary_str = format!(
            "{} total (C:{} H:{} M:{} L:{} N:{})",
            summary.total(),
            summary.critical,
            summary.high,
            summary.medium,
            summary.low,
            summary.none
        );
        if summary.total() > 0 {
            writeln!(w, "Vulnerabilities: {}", summary_str.red().bold())?;
        } else {
            writeln!(w, "Vulnerabilities: {}", summary_str.green().bold())?;
        }
        writeln!(w)?;

        let unknown = result.unknown_count();
        if summary.total() == 0 && unknown == 0 {
            writeln!(w, "{}", "No known vulnerabilities found.".green())?;
        } else if summary.total() == 0 {
            writeln!(
                w,
                "{}",
                "No known vulnerabilities among assessed components.".yellow()
            )?;
        } else {
            writeln!(
                w,
                "{:<22} {:<10} {:<30} {:<16} Confidence",
                "ID", "Severity", "Package", "Version"
            )?;
            writeln!(w, "{}", "-".repeat(90))?;

            for finding in &result.findings {
                for vuln in finding.status.vulnerabilities() {
                    let severity = vuln.record.severity.to_string();
                    let severity_colored = match vuln.record.severity {
                        Severity::Critical => severity.red().bold(),
                        Severity::High => severity.red(),
                        Severity::Medium => severity.yellow(),
                        Severity::Low => severity.normal(),
                        Severity::None => severity.dimmed(),
                    };
                    let confidence = match vuln.confidence {
                        MatchConfidence::Exact => "exact".normal(),
                        MatchConfidence::Reduced => "reduced".yellow(),
                    };

                    writeln!(
                        w,
                        "{:<22} {:<10} {:<30} {:<16} {}",
                        vuln.record.id,
                        severity_colored,
                        format!("{}/{}", finding.component.ecosystem, finding.component.name),
                        finding.component.version,
                        confidence
                    )?;
                }
            }
        }

        if unknown > 0 {
            writeln!(w)?;
            writeln!(
                w,
                "{}",
                format!("{unknown} components could not be assessed:").yellow().bold()
            )?;
            for finding in result.findings.iter().filter(|f| f.status.is_unknown()) {
                if let defectdetect_analyzer::FindingStatus::Unknown { reason } = &finding.status {
                    writeln!(w, "  {} -- {}", finding.component, reason)?;
                }
            }
        }

        Ok(())
    }
}
