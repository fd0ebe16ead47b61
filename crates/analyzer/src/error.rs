//! 분석기 에러 타입
//!
//! [`AnalyzerError`]는 분석 호출 전체를 실패시키는 에러를,
//! [`SourceError`]는 취약점 소스 질의 한 건의 실패를 나타냅니다.
//!
//! 소스 에러는 분석 호출 밖으로 전파되지 않습니다. 재시도가 소진되면 해당
//! 컴포넌트의 finding이 `Unknown`으로 기록될 뿐입니다.
//!
//! 단일 계산 결과를 여러 대기자에게 나눠주기 위해 두 타입 모두 `Clone`입니다.

use std::time::Duration;

use defectdetect_core::error::{AnalysisError, ConfigError, DefectDetectError, StorageError};

/// 분석기 도메인 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    /// 정규화할 수 없는 컴포넌트
    #[error("invalid component at index {index}: {reason}")]
    InvalidComponent {
        /// 입력 목록 내 위치
        index: usize,
        /// 거부 사유
        reason: String,
    },

    /// 잘못된 호출 인자 (빈 sbom_id 등)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 컴포넌트 수 제한 초과
    #[error("too many components: {count} (max: {max})")]
    TooManyComponents {
        /// 입력 컴포넌트 수
        count: usize,
        /// 허용 최대값
        max: usize,
    },

    /// 저장된 결과 읽기 실패
    #[error("cache read error: {sbom_id}: {reason}")]
    CacheRead {
        /// 대상 SBOM
        sbom_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 결과 저장 실패
    #[error("cache write error: {sbom_id}: {reason}")]
    CacheWrite {
        /// 대상 SBOM
        sbom_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 완료 전에 중단된 분석
    #[error("analysis aborted: {sbom_id}: {reason}")]
    Aborted {
        /// 대상 SBOM
        sbom_id: String,
        /// 중단 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 정적 취약점 DB 로딩 실패
    #[error("vulnerability db load error: {path}: {reason}")]
    VulnDbLoad {
        /// DB 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 정적 취약점 DB 파싱 실패
    #[error("vulnerability db parse error: {0}")]
    VulnDbParse(String),

    /// 취약점 소스 클라이언트 생성 실패
    #[error("source init error: {0}")]
    SourceInit(String),

    /// 내부 에러 (계산 태스크 패닉 등)
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AnalyzerError> for DefectDetectError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::InvalidComponent { .. }
            | AnalyzerError::InvalidInput(_)
            | AnalyzerError::TooManyComponents { .. } => {
                DefectDetectError::Analysis(AnalysisError::InvalidInput(err.to_string()))
            }
            AnalyzerError::CacheRead { .. } => {
                DefectDetectError::Storage(StorageError::Read(err.to_string()))
            }
            AnalyzerError::CacheWrite { .. } => {
                DefectDetectError::Storage(StorageError::Write(err.to_string()))
            }
            AnalyzerError::Aborted { .. } => {
                DefectDetectError::Analysis(AnalysisError::Aborted(err.to_string()))
            }
            AnalyzerError::Config { field, reason } => {
                DefectDetectError::Config(ConfigError::InvalidValue { field, reason })
            }
            AnalyzerError::VulnDbLoad { .. }
            | AnalyzerError::VulnDbParse(_)
            | AnalyzerError::SourceInit(_) => {
                DefectDetectError::Analysis(AnalysisError::Source(err.to_string()))
            }
            AnalyzerError::Internal(msg) => {
                DefectDetectError::Analysis(AnalysisError::Internal(msg))
            }
        }
    }
}

/// 취약점 소스 질의 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// 네트워크 장애, 5xx, 타임아웃
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// 소스가 요청 속도를 제한함
    #[error("rate limited (retry after: {retry_after:?})")]
    RateLimited {
        /// 서버가 지정한 재시도 대기 시간
        retry_after: Option<Duration>,
    },

    /// 응답을 해석할 수 없음
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// 소스가 해당 에코시스템을 지원하지 않음
    #[error("unsupported ecosystem: {0}")]
    UnsupportedEcosystem(String),
}

impl SourceError {
    /// 같은 질의를 다시 시도할 가치가 있는지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited { .. })
    }

    /// 서버가 지정한 최소 대기 시간
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// 메트릭 레이블용 짧은 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::MalformedResponse(_) => "malformed",
            Self::UnsupportedEcosystem(_) => "unsupported",
        }
    }
}
