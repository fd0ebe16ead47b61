//! 에러 타입 -- 도메인별 에러 정의

/// defectdetect 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DefectDetectError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 취약점 분석 에러
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// 결과 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 취약점 분석 에러
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// 입력 컴포넌트 목록이 유효하지 않음
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 분석이 완료되기 전에 중단됨
    #[error("analysis aborted: {0}")]
    Aborted(String),

    /// 취약점 소스 초기화 실패
    #[error("vulnerability source error: {0}")]
    Source(String),

    /// 내부 에러 (태스크 패닉 등)
    #[error("internal error: {0}")]
    Internal(String),
}

/// 결과 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장된 결과 읽기 실패
    #[error("read failed: {0}")]
    Read(String),

    /// 결과 쓰기 실패
    #[error("write failed: {0}")]
    Write(String),
}
