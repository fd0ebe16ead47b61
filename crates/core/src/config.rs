//! 설정 관리 -- defectdetect.toml 파싱 및 런타임 설정
//!
//! [`DefectDetectConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DEFECTDETECT_ANALYSIS_MAX_ATTEMPTS=6` 형식)
//! 3. 설정 파일 (`defectdetect.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), defectdetect_core::error::DefectDetectError> {
//! use defectdetect_core::config::DefectDetectConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DefectDetectConfig::load("defectdetect.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DefectDetectConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DefectDetectError};

/// defectdetect 통합 설정
///
/// `defectdetect.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefectDetectConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 분석 파이프라인 설정
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// 취약점 소스 설정
    #[serde(default)]
    pub source: SourceConfig,
    /// 분석 결과 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
}

impl DefectDetectConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DefectDetectError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값을 사용하여 로드합니다.
    ///
    /// 파일 외의 에러(파싱 실패, 검증 실패)는 그대로 반환합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DefectDetectError> {
        let mut config = match Self::from_file(path.as_ref()).await {
            Ok(config) => config,
            Err(DefectDetectError::Config(ConfigError::FileNotFound { path })) => {
                tracing::debug!(path = %path, "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DefectDetectError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DefectDetectError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DefectDetectError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DefectDetectError> {
        toml::from_str(toml_str).map_err(|e| {
            DefectDetectError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DEFECTDETECT_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DEFECTDETECT_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "DEFECTDETECT_GENERAL_LOG_FORMAT",
        );

        // Analysis
        override_usize(
            &mut self.analysis.max_concurrent_queries,
            "DEFECTDETECT_ANALYSIS_MAX_CONCURRENT_QUERIES",
        );
        override_u32(
            &mut self.analysis.max_attempts,
            "DEFECTDETECT_ANALYSIS_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.analysis.retry_backoff_base_ms,
            "DEFECTDETECT_ANALYSIS_RETRY_BACKOFF_BASE_MS",
        );
        override_u64(
            &mut self.analysis.retry_backoff_max_ms,
            "DEFECTDETECT_ANALYSIS_RETRY_BACKOFF_MAX_MS",
        );
        override_u64(
            &mut self.analysis.query_timeout_secs,
            "DEFECTDETECT_ANALYSIS_QUERY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.analysis.default_freshness_secs,
            "DEFECTDETECT_ANALYSIS_DEFAULT_FRESHNESS_SECS",
        );
        override_usize(
            &mut self.analysis.max_components,
            "DEFECTDETECT_ANALYSIS_MAX_COMPONENTS",
        );

        // Source
        override_string(&mut self.source.kind, "DEFECTDETECT_SOURCE_KIND");
        override_string(&mut self.source.osv_url, "DEFECTDETECT_SOURCE_OSV_URL");
        override_string(
            &mut self.source.static_db_path,
            "DEFECTDETECT_SOURCE_STATIC_DB_PATH",
        );

        // Store
        override_string(&mut self.store.kind, "DEFECTDETECT_STORE_KIND");
        override_string(&mut self.store.dir, "DEFECTDETECT_STORE_DIR");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 수치 범위 검증은 analyzer 크레이트의 `AnalyzerConfig::validate()`가 담당합니다.
    pub fn validate(&self) -> Result<(), DefectDetectError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        let valid_sources = ["osv", "static"];
        if !valid_sources.contains(&self.source.kind.as_str()) {
            return Err(invalid(
                "source.kind",
                format!("must be one of: {}", valid_sources.join(", ")),
            ));
        }

        if self.source.kind == "osv"
            && !(self.source.osv_url.starts_with("https://")
                || self.source.osv_url.starts_with("http://"))
        {
            return Err(invalid(
                "source.osv_url",
                "must be an http(s) URL".to_owned(),
            ));
        }

        if self.source.kind == "static" && self.source.static_db_path.is_empty() {
            return Err(invalid(
                "source.static_db_path",
                "must not be empty when source.kind is 'static'".to_owned(),
            ));
        }

        let valid_stores = ["memory", "file"];
        if !valid_stores.contains(&self.store.kind.as_str()) {
            return Err(invalid(
                "store.kind",
                format!("must be one of: {}", valid_stores.join(", ")),
            ));
        }

        if self.store.kind == "file" {
            if self.store.dir.is_empty() {
                return Err(invalid(
                    "store.dir",
                    "must not be empty when store.kind is 'file'".to_owned(),
                ));
            }
            if Path::new(&self.store.dir)
                .components()
                .any(|c| c == std::path::Component::ParentDir)
            {
                return Err(invalid(
                    "store.dir",
                    format!("'{}' contains path traversal pattern '..'", self.store.dir),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> DefectDetectError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 분석 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 취약점 소스 동시 질의 상한
    pub max_concurrent_queries: usize,
    /// 컴포넌트당 최대 질의 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 재시도 backoff 기준값 (밀리초)
    pub retry_backoff_base_ms: u64,
    /// 재시도 backoff 상한 (밀리초)
    pub retry_backoff_max_ms: u64,
    /// 질의 1회당 타임아웃 (초)
    pub query_timeout_secs: u64,
    /// 호출자가 지정하지 않을 때 사용하는 freshness window (초)
    pub default_freshness_secs: u64,
    /// SBOM 하나에 허용되는 최대 컴포넌트 수
    pub max_components: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 16,
            max_attempts: 4,
            retry_backoff_base_ms: 250,
            retry_backoff_max_ms: 8_000,
            query_timeout_secs: 30,
            default_freshness_secs: 3_600,
            max_components: 50_000,
        }
    }
}

/// 취약점 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 소스 종류 (osv, static)
    pub kind: String,
    /// OSV query API 엔드포인트
    pub osv_url: String,
    /// 정적 취약점 DB 디렉토리 (kind = "static")
    pub static_db_path: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "osv".to_owned(),
            osv_url: "https://api.osv.dev/v1/query".to_owned(),
            static_db_path: String::new(),
        }
    }
}

/// 분석 결과 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 저장소 종류 (memory, file)
    pub kind: String,
    /// 결과 파일 디렉토리 (kind = "file")
    pub dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: "file".to_owned(),
            dir: "/var/lib/defectdetect/results".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
