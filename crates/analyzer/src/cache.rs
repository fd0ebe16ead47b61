//! 결과 캐시 -- 신선도 정책과 결과 저장소
//!
//! [`ResultCache`]는 [`ResultStore`] 위에서 신선도 판정을 수행합니다.
//! 저장된 결과는 `now - computed_at <= freshness`일 때만 유효합니다.
//!
//! # 저장소 구현
//!
//! - [`MemoryResultStore`]: 프로세스 내 맵. 교체는 `Arc` 포인터 단위로 원자적
//! - [`FileResultStore`]: sbom_id당 JSON 파일 하나. 임시 파일에 쓴 뒤 rename하므로
//!   읽는 쪽은 부분적으로 쓰인 문서를 보지 않습니다.
//!
//! 보존 기간 관리는 저장소의 몫입니다.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;

use crate::error::AnalyzerError;
use crate::result::{AnalysisResult, SharedResult};

/// sbom_id 최대 길이
const MAX_SBOM_ID_LEN: usize = 256;

/// 분석 결과 저장소 trait
///
/// 한 sbom_id에 대해 가장 최근 결과 하나만 보관합니다.
/// `save`는 원자적이어야 합니다: 읽는 쪽은 이전 결과 또는 새 결과 전체만 관측합니다.
pub trait ResultStore: Send + Sync + 'static {
    /// 저장된 결과를 읽습니다. 없으면 `None`
    fn load(
        &self,
        sbom_id: &str,
    ) -> impl Future<Output = Result<Option<SharedResult>, AnalyzerError>> + Send;

    /// 결과를 저장합니다. 기존 결과는 교체됩니다.
    fn save(
        &self,
        sbom_id: &str,
        result: SharedResult,
    ) -> impl Future<Output = Result<(), AnalyzerError>> + Send;

    /// 저장된 결과를 제거합니다. 없으면 아무 일도 하지 않습니다.
    fn remove(&self, sbom_id: &str) -> impl Future<Output = Result<(), AnalyzerError>> + Send;
}

impl<R: ResultStore> ResultStore for Arc<R> {
    fn load(
        &self,
        sbom_id: &str,
    ) -> impl Future<Output = Result<Option<SharedResult>, AnalyzerError>> + Send {
        self.as_ref().load(sbom_id)
    }

    fn save(
        &self,
        sbom_id: &str,
        result: SharedResult,
    ) -> impl Future<Output = Result<(), AnalyzerError>> + Send {
        self.as_ref().save(sbom_id, result)
    }

    fn remove(&self, sbom_id: &str) -> impl Future<Output = Result<(), AnalyzerError>> + Send {
        self.as_ref().remove(sbom_id)
    }
}

/// sbom_id 유효성 검사
///
/// 비어있거나, 너무 길거나, 경로 구분자/`..`/제어 문자를 포함하면 거부합니다.
pub fn validate_sbom_id(sbom_id: &str) -> Result<(), AnalyzerError> {
    if sbom_id.trim().is_empty() {
        return Err(AnalyzerError::InvalidInput("sbom_id must not be empty".to_owned()));
    }
    if sbom_id.len() > MAX_SBOM_ID_LEN {
        return Err(AnalyzerError::InvalidInput(format!(
            "sbom_id exceeds {MAX_SBOM_ID_LEN} bytes"
        )));
    }
    if sbom_id.contains(['/', '\\']) || sbom_id.contains("..") || sbom_id.chars().any(char::is_control)
    {
        return Err(AnalyzerError::InvalidInput(format!(
            "sbom_id contains forbidden characters: {sbom_id:?}"
        )));
    }
    Ok(())
}

/// 메모리 결과 저장소
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: RwLock<HashMap<String, SharedResult>>,
}

impl MemoryResultStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 결과 수
    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    /// 비어있는지 여부
    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

impl ResultStore for MemoryResultStore {
    async fn load(&self, sbom_id: &str) -> Result<Option<SharedResult>, AnalyzerError> {
        Ok(self.results.read().await.get(sbom_id).cloned())
    }

    async fn save(&self, sbom_id: &str, result: SharedResult) -> Result<(), AnalyzerError> {
        self.results.write().await.insert(sbom_id.to_owned(), result);
        Ok(())
    }

    async fn remove(&self, sbom_id: &str) -> Result<(), AnalyzerError> {
        self.results.write().await.remove(sbom_id);
        Ok(())
    }
}

/// 파일 결과 저장소
///
/// `<dir>/<sbom_id>.json` 파일에 결과를 저장합니다.
#[derive(Debug, Clone)]
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    /// 디렉토리를 지정하여 저장소를 생성합니다. 디렉토리는 첫 저장 시 생성됩니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 저장 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, sbom_id: &str) -> Result<PathBuf, AnalyzerError> {
        validate_sbom_id(sbom_id)?;
        Ok(self.dir.join(format!("{sbom_id}.json")))
    }
}

impl ResultStore for FileResultStore {
    async fn load(&self, sbom_id: &str) -> Result<Option<SharedResult>, AnalyzerError> {
        let path = self.path_for(sbom_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AnalyzerError::CacheRead {
                    sbom_id: sbom_id.to_owned(),
                    reason: format!("{}: {e}", path.display()),
                });
            }
        };

        let result: AnalysisResult =
            serde_json::from_slice(&bytes).map_err(|e| AnalyzerError::CacheRead {
                sbom_id: sbom_id.to_owned(),
                reason: format!("corrupt result file {}: {e}", path.display()),
            })?;
        Ok(Some(Arc::new(result)))
    }

    async fn save(&self, sbom_id: &str, result: SharedResult) -> Result<(), AnalyzerError> {
        let path = self.path_for(sbom_id)?;
        let write_err = |reason: String| AnalyzerError::CacheWrite {
            sbom_id: sbom_id.to_owned(),
            reason,
        };

        let json = serde_json::to_vec_pretty(result.as_ref())
            .map_err(|e| write_err(format!("serialize: {e}")))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_err(format!("{}: {e}", self.dir.display())))?;

        let tmp = self
            .dir
            .join(format!(".{sbom_id}.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            return Err(write_err(format!("{}: {e}", tmp.display())));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(format!("{}: {e}", path.display())));
        }

        tracing::debug!(sbom_id, path = %path.display(), bytes = json.len(), "result stored");
        Ok(())
    }

    async fn remove(&self, sbom_id: &str) -> Result<(), AnalyzerError> {
        let path = self.path_for(sbom_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AnalyzerError::CacheWrite {
                sbom_id: sbom_id.to_owned(),
                reason: format!("{}: {e}", path.display()),
            }),
        }
    }
}

/// 신선도 정책을 적용하는 결과 캐시
pub struct ResultCache<R> {
    store: R,
}

impl<R: ResultStore> ResultCache<R> {
    /// 저장소를 감쌉니다.
    pub fn new(store: R) -> Self {
        Self { store }
    }

    /// 내부 저장소 참조
    pub fn store(&self) -> &R {
        &self.store
    }

    /// 신선도 창 안의 결과를 반환합니다.
    ///
    /// - `freshness`가 0이면 항상 `None` (재계산 강제)
    /// - `computed_at`이 미래이면 경과 시간 0으로 간주
    pub async fn get(
        &self,
        sbom_id: &str,
        freshness: Duration,
    ) -> Result<Option<SharedResult>, AnalyzerError> {
        if freshness.is_zero() {
            return Ok(None);
        }
        let Some(result) = self.store.load(sbom_id).await? else {
            return Ok(None);
        };

        let age = result.age(SystemTime::now());
        if age <= freshness {
            Ok(Some(result))
        } else {
            tracing::debug!(
                sbom_id,
                age_secs = age.as_secs(),
                freshness_secs = freshness.as_secs(),
                "cached result is stale"
            );
            Ok(None)
        }
    }

    /// 결과를 게시합니다.
    ///
    /// `computed_at`은 이전에 저장된 값 이상으로 보정됩니다. 저장이 실패해도
    /// 게시할 `Arc`는 반환되며, 실패는 두 번째 값으로 보고됩니다.
    pub async fn put(&self, mut result: AnalysisResult) -> (SharedResult, Result<(), AnalyzerError>) {
        let sbom_id = result.sbom_id.clone();

        match self.store.load(&sbom_id).await {
            Ok(Some(previous)) if previous.computed_at > result.computed_at => {
                result.computed_at = previous.computed_at;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(sbom_id = %sbom_id, error = %e, "could not read previous result");
            }
        }

        let shared = Arc::new(result);
        let saved = self.store.save(&sbom_id, Arc::clone(&shared)).await;
        (shared, saved)
    }

    /// 저장된 결과를 제거합니다.
    pub async fn invalidate(&self, sbom_id: &str) -> Result<(), AnalyzerError> {
        self.store.remove(sbom_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(sbom_id: &str) -> AnalysisResult {
        AnalysisResult::assemble(sbom_id, vec![], 0)
    }

    #[test]
    fn sbom_id_validation() {
        assert!(validate_sbom_id("sbom-2024.01").is_ok());
        assert!(validate_sbom_id("").is_err());
        assert!(validate_sbom_id("   ").is_err());
        assert!(validate_sbom_id("../etc/passwd").is_err());
        assert!(validate_sbom_id("a/b").is_err());
        assert!(validate_sbom_id("a\\b").is_err());
        assert!(validate_sbom_id("a\nb").is_err());
        assert!(validate_sbom_id(&"x".repeat(MAX_SBOM_ID_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn memory_store_save_load_remove() {
        let store = MemoryResultStore::new();
        assert!(store.is_empty().await);

        store.save("s1", Arc::new(result("s1"))).await.unwrap();
        assert_eq!(store.len().await, 1);
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.sbom_id, "s1");

        store.remove("s1").await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
        store.remove("s1").await.unwrap();
    }

    #[tokio::test]
    async fn zero_freshness_always_misses() {
        let cache = ResultCache::new(MemoryResultStore::new());
        let (_, saved) = cache.put(result("s1")).await;
        saved.unwrap();

        assert!(cache.get("s1", Duration::ZERO).await.unwrap().is_none());
        assert!(cache.get("s1", Duration::from_secs(60)).await.unwrap().is_some());
        assert!(cache.get("s1", Duration::MAX).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_result_misses() {
        let cache = ResultCache::new(MemoryResultStore::new());
        let mut old = result("s1");
        old.computed_at = SystemTime::now() - Duration::from_secs(600);
        cache.store().save("s1", Arc::new(old)).await.unwrap();

        assert!(cache.get("s1", Duration::from_secs(60)).await.unwrap().is_none());
        assert!(cache.get("s1", Duration::from_secs(3600)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn future_timestamp_counts_as_fresh() {
        let cache = ResultCache::new(MemoryResultStore::new());
        let mut skewed = result("s1");
        skewed.computed_at = SystemTime::now() + Duration::from_secs(3600);
        cache.store().save("s1", Arc::new(skewed)).await.unwrap();

        assert!(cache.get("s1", Duration::from_secs(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_keeps_computed_at_monotonic() {
        let cache = ResultCache::new(MemoryResultStore::new());
        let ahead = SystemTime::now() + Duration::from_secs(120);
        let mut first = result("s1");
        first.computed_at = ahead;
        let (_, saved) = cache.put(first).await;
        saved.unwrap();

        let (second, saved) = cache.put(result("s1")).await;
        saved.unwrap();
        assert_eq!(second.computed_at, ahead);
    }

    #[tokio::test]
    async fn invalidate_removes_result() {
        let cache = ResultCache::new(MemoryResultStore::new());
        let (_, saved) = cache.put(result("s1")).await;
        saved.unwrap();
        cache.invalidate("s1").await.unwrap();
        assert!(cache.get("s1", Duration::MAX).await.unwrap().is_none());
    }
}
