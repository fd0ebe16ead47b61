//! CLI-specific error types and exit code mapping

use defectdetect_analyzer::AnalyzerError;
use defectdetect_core::error::DefectDetectError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The component list could not be read or parsed.
    #[error("invalid component list: {0}")]
    Input(String),

    /// The analysis found vulnerable components.
    #[error("found {count} vulnerabilities")]
    Vulnerable { count: usize },

    /// Some components could not be assessed and none matched.
    #[error("{unknown} components could not be assessed")]
    Incomplete { unknown: usize },

    /// The analysis did not finish before the deadline.
    #[error("analysis aborted: {0}")]
    Aborted(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from defectdetect-core.
    #[error("{0}")]
    Core(#[from] DefectDetectError),

    /// Analyzer domain error.
    #[error("analysis error: {0}")]
    Analysis(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                 |
    /// |------|-----------------------------------------|
    /// | 0    | Success, no vulnerable components       |
    /// | 1    | General / command / analysis error      |
    /// | 2    | Configuration error                     |
    /// | 3    | Invalid component list                  |
    /// | 4    | Analysis found vulnerabilities          |
    /// | 5    | Deadline exceeded                       |
    /// | 6    | Some components could not be assessed   |
    /// | 10   | IO error                                |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(DefectDetectError::Config(_)) => 2,
            Self::Input(_) => 3,
            Self::Vulnerable { .. } => 4,
            Self::Aborted(_) => 5,
            Self::Incomplete { .. } => 6,
            Self::Io(_) | Self::Core(DefectDetectError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Analysis(_) => 1,
        }
    }
}

impl From<AnalyzerError> for CliError {
    fn from(e: AnalyzerError) -> Self {
        match e {
            AnalyzerError::Aborted { .. } => Self::Aborted(e.to_string()),
            AnalyzerError::InvalidComponent { .. }
            | AnalyzerError::TooManyComponents { .. }
            | AnalyzerError::InvalidInput(_) => Self::Input(e.to_string()),
            AnalyzerError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Analysis(other.to_string()),
        }
    }
}
