//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// defectdetect -- SBOM vulnerability analysis.
///
/// Use `defectdetect <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "defectdetect", version, about, long_about = None)]
pub struct Cli {
    /// Path to the defectdetect.toml configuration file (defaults apply if absent).
    #[arg(short, long, default_value = "defectdetect.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a component list for known vulnerabilities.
    Analyze(AnalyzeArgs),

    /// Drop the stored result of an SBOM so the next analysis recomputes it.
    Invalidate(InvalidateArgs),
}

// ---- analyze ----

/// Analyze the components extracted from one SBOM.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// JSON file with the component list (array, or object with a `components` array).
    pub components: PathBuf,

    /// Identifier of the SBOM the components belong to.
    #[arg(long)]
    pub sbom_id: String,

    /// Reuse a stored result younger than this many seconds (0 forces recomputation).
    #[arg(long)]
    pub freshness_secs: Option<u64>,

    /// Give up waiting after this many seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Use a local vulnerability database directory instead of the configured source.
    #[arg(long)]
    pub offline_db: Option<PathBuf>,
}

// ---- invalidate ----

/// Remove the stored result of one SBOM.
#[derive(Args, Debug)]
pub struct InvalidateArgs {
    /// Identifier of the SBOM to invalidate.
    #[arg(long)]
    pub sbom_id: String,
}
