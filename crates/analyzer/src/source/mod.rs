//! 취약점 소스 -- 외부 취약점 정보 질의 계약
//!
//! [`VulnerabilitySource`]는 컴포넌트 키 하나에 대한 후보 취약점 레코드를 반환합니다.
//! 질의는 멱등이므로 재시도해도 안전합니다.
//!
//! # 구현
//!
//! - [`OsvSource`](osv::OsvSource): api.osv.dev 원격 질의
//! - [`StaticSource`](static_db::StaticSource): 로컬 JSON DB (오프라인, 테스트)
//!
//! [`BoundedSource`]는 임의의 소스를 세마포어로 감싸 동시 질의 수를 제한합니다.
//! 상한을 넘는 질의는 실패하지 않고 대기합니다.

pub mod osv;
pub mod static_db;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use defectdetect_core::types::Severity;

use crate::component::ComponentKey;
use crate::error::SourceError;

/// 취약점 레코드
///
/// 소스가 반환한 읽기 전용 데이터입니다. 매칭은 분석기가 수행합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// 취약점 ID (예: GHSA-xxxx, CVE-2024-1234)
    pub id: String,
    /// 요약
    #[serde(default)]
    pub summary: String,
    /// 심각도
    #[serde(default)]
    pub severity: Severity,
    /// 영향받는 버전 범위 (순서 유지)
    #[serde(default)]
    pub affected_ranges: Vec<VersionRange>,
    /// 별칭 ID (CVE 등)
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// 영향받는 버전 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionRange {
    /// 구간: `introduced <= v < fixed` 또는 `introduced <= v <= last_affected`
    Interval {
        /// 도입 버전 (포함). None이면 하한 없음
        #[serde(default)]
        introduced: Option<String>,
        /// 수정 버전 (제외). None이면 미수정
        #[serde(default)]
        fixed: Option<String>,
        /// 마지막 영향 버전 (포함)
        #[serde(default)]
        last_affected: Option<String>,
    },
    /// 명시적으로 나열된 영향 버전
    Enumerated {
        /// 영향 버전 목록
        versions: Vec<String>,
    },
}

impl VersionRange {
    /// `introduced`/`fixed` 구간을 생성합니다.
    pub fn interval(introduced: Option<&str>, fixed: Option<&str>) -> Self {
        Self::Interval {
            introduced: introduced.map(str::to_owned),
            fixed: fixed.map(str::to_owned),
            last_affected: None,
        }
    }

    /// 버전 목록 범위를 생성합니다.
    pub fn enumerated<I, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::Enumerated {
            versions: versions.into_iter().map(Into::into).collect(),
        }
    }
}

/// 취약점 소스 trait
///
/// # 구현 요구사항
///
/// - 멱등: 같은 키로 여러 번 질의해도 부작용이 없어야 함
/// - 실패는 [`SourceError`]로 분류하여 반환 (재시도 판단은 호출자 몫)
pub trait VulnerabilitySource: Send + Sync + 'static {
    /// 로그/메트릭에 사용하는 소스 이름
    fn name(&self) -> &str;

    /// 키에 해당하는 패키지의 후보 취약점 레코드를 반환합니다.
    ///
    /// 버전 필터링 없이 패키지의 모든 레코드를 반환해도 됩니다.
    ///
    /// # Errors
    ///
    /// - `SourceError::Unavailable`: 네트워크/서버 장애
    /// - `SourceError::RateLimited`: 속도 제한
    /// - `SourceError::MalformedResponse`: 응답 해석 실패
    /// - `SourceError::UnsupportedEcosystem`: 에코시스템 미지원
    fn query(
        &self,
        key: &ComponentKey,
    ) -> impl Future<Output = Result<Vec<VulnerabilityRecord>, SourceError>> + Send;
}

impl<S: VulnerabilitySource> VulnerabilitySource for Arc<S> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn query(
        &self,
        key: &ComponentKey,
    ) -> impl Future<Output = Result<Vec<VulnerabilityRecord>, SourceError>> + Send {
        self.as_ref().query(key)
    }
}

/// 동시 질의 수가 제한된 소스
///
/// 복제본은 같은 세마포어를 공유하므로, 하나의 분석기 인스턴스 안의 모든 분석이
/// 단일 예산을 나눠 씁니다. permit은 질의 1회 동안만 유지됩니다.
pub struct BoundedSource<S> {
    inner: Arc<S>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl<S> Clone for BoundedSource<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            permits: Arc::clone(&self.permits),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl<S: VulnerabilitySource> BoundedSource<S> {
    /// 소스를 동시성 상한으로 감쌉니다. 상한은 최소 1입니다.
    pub fn new(inner: S, max_concurrent: usize) -> Self {
        Self::from_arc(Arc::new(inner), max_concurrent)
    }

    /// 이미 공유 중인 소스를 감쌉니다.
    pub fn from_arc(inner: Arc<S>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// 내부 소스 참조
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// 설정된 동시성 상한
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 현재 사용 가능한 permit 수
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// permit을 얻은 뒤 질의합니다. 상한에 도달하면 대기합니다.
    pub async fn query(&self, key: &ComponentKey) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        // 세마포어는 닫지 않으므로 acquire는 실패하지 않는다
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(format!("query budget closed: {e}")))?;
        self.inner.query(key).await
    }

    /// permit을 얻은 뒤 제한 시간 안에 질의합니다.
    ///
    /// 제한 시간은 permit을 얻은 뒤부터 적용되며, 초과하면 `SourceError::Unavailable`입니다.
    pub async fn query_within(
        &self,
        key: &ComponentKey,
        timeout: Duration,
    ) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(format!("query budget closed: {e}")))?;
        match tokio::time::timeout(timeout, self.inner.query(key)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SourceError::Unavailable(format!(
                "query timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}
