//! 분석기 설정
//!
//! [`AnalyzerConfig`]는 core의 [`AnalysisConfig`](defectdetect_core::config::AnalysisConfig)에서
//! 파생되며, 동시성 상한과 재시도 정책, freshness 기본값을 정의합니다.
//!
//! # 사용 예시
//!
//! ```
//! use defectdetect_analyzer::AnalyzerConfigBuilder;
//!
//! let config = AnalyzerConfigBuilder::new()
//!     .max_concurrent_queries(8)
//!     .max_attempts(3)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_attempts, 3);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

/// 설정 상한값 상수
const MAX_CONCURRENT_QUERIES_LIMIT: usize = 256;
const MAX_ATTEMPTS_LIMIT: u32 = 10;
const MAX_QUERY_TIMEOUT_SECS: u64 = 300;
const MAX_COMPONENTS_LIMIT: usize = 500_000;

/// 분석기 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// 취약점 소스 동시 질의 상한 (모든 분석이 공유)
    pub max_concurrent_queries: usize,
    /// 컴포넌트당 최대 질의 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 재시도 backoff 기준값 (밀리초). n번째 재시도는 `base * 2^(n-1)` 대기
    pub retry_backoff_base_ms: u64,
    /// 재시도 backoff 상한 (밀리초)
    pub retry_backoff_max_ms: u64,
    /// 질의 1회당 타임아웃 (초)
    pub query_timeout_secs: u64,
    /// 호출자가 freshness를 지정하지 않을 때의 기본값 (초)
    pub default_freshness_secs: u64,
    /// SBOM 하나에 허용되는 최대 컴포넌트 수
    pub max_components: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::from_core(&defectdetect_core::config::AnalysisConfig::default())
    }
}

impl AnalyzerConfig {
    /// core의 `AnalysisConfig`에서 분석기 설정을 생성합니다.
    pub fn from_core(core: &defectdetect_core::config::AnalysisConfig) -> Self {
        Self {
            max_concurrent_queries: core.max_concurrent_queries,
            max_attempts: core.max_attempts,
            retry_backoff_base_ms: core.retry_backoff_base_ms,
            retry_backoff_max_ms: core.retry_backoff_max_ms,
            query_timeout_secs: core.query_timeout_secs,
            default_freshness_secs: core.default_freshness_secs,
            max_components: core.max_components,
        }
    }

    /// 질의 1회당 타임아웃
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// 기본 freshness window
    pub fn default_freshness(&self) -> Duration {
        Duration::from_secs(self.default_freshness_secs)
    }

    /// `retry`번째 재시도(1부터) 전에 대기할 시간을 계산합니다.
    ///
    /// `base * 2^(retry-1)`을 `retry_backoff_max_ms`로 제한합니다.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(20);
        let ms = self
            .retry_backoff_base_ms
            .saturating_mul(1_u64 << exp)
            .min(self.retry_backoff_max_ms);
        Duration::from_millis(ms)
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `max_concurrent_queries`: 1-256
    /// - `max_attempts`: 1-10
    /// - `retry_backoff_base_ms` <= `retry_backoff_max_ms`
    /// - `query_timeout_secs`: 1-300
    /// - `max_components`: 1-500000
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.max_concurrent_queries == 0
            || self.max_concurrent_queries > MAX_CONCURRENT_QUERIES_LIMIT
        {
            return Err(AnalyzerError::Config {
                field: "max_concurrent_queries".to_owned(),
                reason: format!("must be 1-{MAX_CONCURRENT_QUERIES_LIMIT}"),
            });
        }

        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(AnalyzerError::Config {
                field: "max_attempts".to_owned(),
                reason: format!("must be 1-{MAX_ATTEMPTS_LIMIT}"),
            });
        }

        if self.retry_backoff_base_ms > self.retry_backoff_max_ms {
            return Err(AnalyzerError::Config {
                field: "retry_backoff_base_ms".to_owned(),
                reason: format!(
                    "must not exceed retry_backoff_max_ms ({})",
                    self.retry_backoff_max_ms
                ),
            });
        }

        if self.query_timeout_secs == 0 || self.query_timeout_secs > MAX_QUERY_TIMEOUT_SECS {
            return Err(AnalyzerError::Config {
                field: "query_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_QUERY_TIMEOUT_SECS}"),
            });
        }

        if self.max_components == 0 || self.max_components > MAX_COMPONENTS_LIMIT {
            return Err(AnalyzerError::Config {
                field: "max_components".to_owned(),
                reason: format!("must be 1-{MAX_COMPONENTS_LIMIT}"),
            });
        }

        Ok(())
    }
}

/// 분석기 설정 빌더
#[derive(Debug, Default)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 동시 질의 상한을 설정합니다.
    pub fn max_concurrent_queries(mut self, max: usize) -> Self {
        self.config.max_concurrent_queries = max;
        self
    }

    /// 최대 시도 횟수를 설정합니다.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// backoff 기준값(밀리초)을 설정합니다.
    pub fn retry_backoff_base_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_base_ms = ms;
        self
    }

    /// backoff 상한(밀리초)을 설정합니다.
    pub fn retry_backoff_max_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_max_ms = ms;
        self
    }

    /// 질의 타임아웃(초)을 설정합니다.
    pub fn query_timeout_secs(mut self, secs: u64) -> Self {
        self.config.query_timeout_secs = secs;
        self
    }

    /// 기본 freshness window(초)를 설정합니다.
    pub fn default_freshness_secs(mut self, secs: u64) -> Self {
        self.config.default_freshness_secs = secs;
        self
    }

    /// 최대 컴포넌트 수를 설정합니다.
    pub fn max_components(mut self, max: usize) -> Self {
        self.config.max_components = max;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `AnalyzerError::Config` 반환
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
