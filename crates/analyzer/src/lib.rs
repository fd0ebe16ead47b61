#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`AnalyzerError`, `SourceError`)
//! - [`config`]: Analyzer configuration (`AnalyzerConfig`, builder)
//! - [`component`]: Component key normalization and deduplication (`ComponentKey`, `ComponentPlan`)
//! - [`source`]: Vulnerability source contract (`VulnerabilitySource`, `BoundedSource`, OSV, static DB)
//! - [`matcher`]: Ecosystem-aware version range matching (`VersionScheme`, `affected_by`)
//! - [`result`]: Analysis result types (`AnalysisResult`, `ComponentFinding`, `SeverityCounts`)
//! - [`cache`]: Freshness policy and result stores (`ResultCache`, `ResultStore`)
//! - [`analyzer`]: Single-flight coordinator (`VulnerabilityAnalyzer`)

pub mod analyzer;
pub mod cache;
pub mod component;
pub mod config;
pub mod error;
pub mod matcher;
pub mod result;
pub mod source;

// --- Public API Re-exports ---

// Coordinator
pub use analyzer::{AnalysisReport, AnalyzerStats, ResultOrigin, VulnerabilityAnalyzer};

// Configuration
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder};

// Error
pub use error::{AnalyzerError, SourceError};

// Components
pub use component::{ComponentKey, ComponentPlan, Occurrence, RawComponent, normalize};

// Sources
pub use source::osv::OsvSource;
pub use source::static_db::{StaticEntry, StaticSource};
pub use source::{BoundedSource, VersionRange, VulnerabilityRecord, VulnerabilitySource};

// Matching
pub use matcher::{MatchConfidence, MatchOutcome, VersionScheme, affected_by, matches};

// Results
pub use result::{
    AnalysisResult, ComponentFinding, FindingStatus, MatchedVulnerability, SeverityCounts,
    SharedResult,
};

// Cache
pub use cache::{FileResultStore, MemoryResultStore, ResultCache, ResultStore};
