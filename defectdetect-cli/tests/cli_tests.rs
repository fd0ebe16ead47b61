//! Integration tests for the `analyze` and `invalidate` commands.
//!
//! Runs the command handlers against an offline vulnerability database in a
//! temp directory, so no network access is needed.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use defectdetect_analyzer::{FindingStatus, ResultOrigin};
use defectdetect_cli::cli::{AnalyzeArgs, InvalidateArgs, OutputFormat};
use defectdetect_cli::commands::{analyze, invalidate};
use defectdetect_cli::error::CliError;
use defectdetect_cli::output::OutputWriter;
use defectdetect_core::config::DefectDetectConfig;

const VULN_DB: &str = r#"[
    {
        "id": "GHSA-35jh-r3h4-6jhm",
        "package": "lodash",
        "ecosystem": "npm",
        "summary": "Command injection in lodash",
        "severity": "HIGH",
        "affected_ranges": [
            { "type": "interval", "introduced": "4.0.0", "fixed": "4.17.21" }
        ]
    }
]"#;

const COMPONENTS: &str = r#"{
    "components": [
        { "name": "lodash", "version": "4.17.20", "ecosystem": "npm", "bom-ref": "pkg-1" },
        { "name": "express", "version": "4.18.2", "ecosystem": "npm" }
    ]
}"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("should create temp dir");
        fs::create_dir(dir.path().join("db")).expect("should create db dir");
        fs::write(dir.path().join("db").join("npm.json"), VULN_DB).expect("should write db");
        fs::write(dir.path().join("components.json"), COMPONENTS)
            .expect("should write components");
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> DefectDetectConfig {
        let toml = format!(
            r#"
[general]
log_level = "warn"

[source]
kind = "static"
static_db_path = "{}"

[store]
kind = "file"
dir = "{}"
"#,
            self.path().join("db").display(),
            self.path().join("results").display()
        );
        DefectDetectConfig::parse(&toml).expect("fixture config should parse")
    }

    fn analyze_args(&self, freshness_secs: Option<u64>) -> AnalyzeArgs {
        AnalyzeArgs {
            components: self.path().join("components.json"),
            sbom_id: "sbom-cli".to_owned(),
            freshness_secs,
            deadline_secs: Some(30),
            offline_db: None,
        }
    }
}

/// Analysis against the configured offline db reports the vulnerable component
#[tokio::test]
async fn test_analyze_with_static_source() {
    let fixture = Fixture::new();
    let config = fixture.config();
    config.validate().expect("fixture config should be valid");

    let report = analyze::analyze(fixture.analyze_args(None), &config)
        .await
        .expect("analysis should succeed");

    assert_eq!(report.origin, ResultOrigin::Computed);
    assert!(report.cache_warning.is_none());
    assert_eq!(report.result.sbom_id, "sbom-cli");
    assert_eq!(report.result.findings.len(), 2);
    assert_eq!(report.result.severity_summary.high, 1);

    let lodash = report
        .result
        .findings
        .iter()
        .find(|f| f.component.name == "lodash")
        .expect("lodash finding should exist");
    assert_eq!(lodash.entry_refs, vec!["pkg-1"]);
    assert!(matches!(lodash.status, FindingStatus::Assessed { .. }));
    assert_eq!(lodash.status.vulnerabilities()[0].record.id, "GHSA-35jh-r3h4-6jhm");
}

/// A second run within the freshness window is served from the file store
#[tokio::test]
async fn test_analyze_reuses_stored_result() {
    let fixture = Fixture::new();
    let config = fixture.config();

    let first = analyze::analyze(fixture.analyze_args(Some(3600)), &config)
        .await
        .expect("first analysis should succeed");
    let second = analyze::analyze(fixture.analyze_args(Some(3600)), &config)
        .await
        .expect("second analysis should succeed");

    assert_eq!(second.origin, ResultOrigin::Cache);
    assert_eq!(second.result.analysis_id, first.result.analysis_id);

    let forced = analyze::analyze(fixture.analyze_args(Some(0)), &config)
        .await
        .expect("forced analysis should succeed");
    assert_eq!(forced.origin, ResultOrigin::Computed);
    assert_ne!(forced.result.analysis_id, first.result.analysis_id);
}

/// `--offline-db` takes precedence over the configured source
#[tokio::test]
async fn test_offline_db_flag_overrides_source() {
    let fixture = Fixture::new();
    let mut config = DefectDetectConfig::default();
    config.store.kind = "memory".to_owned();

    let mut args = fixture.analyze_args(None);
    args.offline_db = Some(fixture.path().join("db"));

    let report = analyze::analyze(args, &config)
        .await
        .expect("analysis should succeed without network");
    assert_eq!(report.result.vulnerable_count(), 1);
}

/// The rendered command exits with the vulnerability code when findings exist
#[tokio::test]
async fn test_execute_returns_vulnerable_exit_code() {
    let fixture = Fixture::new();
    let config = fixture.config();
    let writer = OutputWriter::new(OutputFormat::Json);

    let err = analyze::execute(fixture.analyze_args(None), &config, &writer)
        .await
        .expect_err("vulnerable components should fail the command");
    assert!(matches!(err, CliError::Vulnerable { count: 1 }));
    assert_eq!(err.exit_code(), 4);
}

/// A missing component file is an IO error
#[tokio::test]
async fn test_analyze_missing_components_file() {
    let fixture = Fixture::new();
    let config = fixture.config();
    let mut args = fixture.analyze_args(None);
    args.components = fixture.path().join("missing.json");

    let err = analyze::analyze(args, &config).await.unwrap_err();
    assert_eq!(err.exit_code(), 10);
}

/// An invalid component entry maps to the input error code
#[tokio::test]
async fn test_analyze_rejects_invalid_component() {
    let fixture = Fixture::new();
    fs::write(
        fixture.path().join("components.json"),
        r#"[{ "name": "", "version": "1.0.0", "ecosystem": "npm" }]"#,
    )
    .expect("should overwrite components");

    let err = analyze::analyze(fixture.analyze_args(None), &fixture.config())
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Input(_)));
    assert_eq!(err.exit_code(), 3);
}

/// Invalidation removes the stored result so the next run recomputes
#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let fixture = Fixture::new();
    let config = fixture.config();

    analyze::analyze(fixture.analyze_args(Some(3600)), &config)
        .await
        .expect("analysis should succeed");
    assert!(fixture.path().join("results").join("sbom-cli.json").exists());

    let report = invalidate::invalidate(
        InvalidateArgs {
            sbom_id: "sbom-cli".to_owned(),
        },
        &config,
    )
    .await
    .expect("invalidate should succeed");
    assert!(report.removed);
    assert!(!fixture.path().join("results").join("sbom-cli.json").exists());

    let again = analyze::analyze(fixture.analyze_args(Some(3600)), &config)
        .await
        .expect("analysis should succeed");
    assert_eq!(again.origin, ResultOrigin::Computed);
}

/// Path-like sbom ids are refused before touching the store
#[tokio::test]
async fn test_invalidate_rejects_path_traversal() {
    let fixture = Fixture::new();
    let err = invalidate::invalidate(
        InvalidateArgs {
            sbom_id: "../etc/passwd".to_owned(),
        },
        &fixture.config(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

/// Missing config file falls back to defaults
#[tokio::test]
async fn test_config_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = DefectDetectConfig::load_or_default(temp_dir.path().join("defectdetect.toml"))
        .await
        .expect("missing config should fall back to defaults");
    assert_eq!(config.source.kind, "osv");
}

/// Invalid values in the config file are reported as config errors
#[tokio::test]
async fn test_config_invalid_value_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("defectdetect.toml");
    fs::write(&config_path, "[store]\nkind = \"redis\"\n").expect("should write config");

    let err = DefectDetectConfig::load(&config_path).await.unwrap_err();
    let cli_err = CliError::from(err);
    assert_eq!(cli_err.exit_code(), 2);
}
