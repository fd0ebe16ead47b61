//! 분석 코디네이터 -- 단일 실행(single-flight) 분석 오케스트레이션
//!
//! [`VulnerabilityAnalyzer`]는 SBOM 하나의 분석 요청을 받아 다음을 수행합니다:
//!
//! 1. sbom_id 검증, 컴포넌트 정규화 및 중복 제거 (외부 호출 전 실패)
//! 2. 결과 캐시 확인 (신선하면 그대로 반환)
//! 3. sbom_id별 슬롯 확보: 진행 중인 계산이 있으면 합류, 없으면 새로 시작
//! 4. 고유 키별 병렬 질의 (동시성 상한, 재시도, 질의당 타임아웃)
//! 5. 버전 매칭, finding 집계, 심각도 요약
//! 6. 캐시에 게시하고 같은 `Arc<AnalysisResult>`를 모든 대기자에게 반환
//!
//! # 취소
//!
//! 호출자의 deadline(또는 future drop)은 그 호출자만 분리합니다.
//! 계산은 마지막 대기자가 떠날 때만 취소되며, 취소된 계산은 아무것도 게시하지 않습니다.
//! 취소된 계산에는 새 호출자가 합류하지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use defectdetect_core::metrics as m;

use crate::cache::{ResultCache, ResultStore, validate_sbom_id};
use crate::component::{ComponentKey, ComponentPlan, RawComponent};
use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, SourceError};
use crate::matcher::affected_by;
use crate::result::{
    AnalysisResult, ComponentFinding, FindingStatus, MatchedVulnerability, SharedResult,
};
use crate::source::{BoundedSource, VulnerabilityRecord, VulnerabilitySource};

/// 결과의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultOrigin {
    /// 신선한 캐시 결과
    Cache,
    /// 이 호출이 시작한 계산
    Computed,
    /// 진행 중이던 계산에 합류
    Joined,
}

impl ResultOrigin {
    /// 메트릭 레이블용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Computed => "computed",
            Self::Joined => "joined",
        }
    }
}

/// 분석 호출의 반환값
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// 분석 결과 (모든 대기자가 같은 `Arc`를 공유)
    pub result: SharedResult,
    /// 결과의 출처
    pub origin: ResultOrigin,
    /// 결과 저장 실패 (결과 자체는 유효)
    pub cache_warning: Option<AnalyzerError>,
}

/// 분석기 누적 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerStats {
    /// 완료된 계산 수 (캐시 적중 제외)
    pub analyses_completed: u64,
    /// 소스에 보낸 질의 수 (재시도 포함)
    pub queries_issued: u64,
    /// 진행 중인 계산 수
    pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
    analyses_completed: AtomicU64,
    queries_issued: AtomicU64,
}

/// 계산 태스크가 대기자들에게 나눠주는 결과
#[derive(Debug, Clone)]
struct Computed {
    result: SharedResult,
    cache_warning: Option<AnalyzerError>,
    from_cache: bool,
}

type SharedOutcome = Shared<BoxFuture<'static, Result<Computed, AnalyzerError>>>;

/// sbom_id별 진행 중인 계산
struct Slot {
    generation: u64,
    outcome: SharedOutcome,
    cancel: CancellationToken,
    waiters: Arc<AtomicUsize>,
}

type SlotTable = Arc<DashMap<String, Slot>>;

/// 계산 태스크가 끝날 때(정상, 에러, 패닉, 취소 모두) 슬롯을 해제합니다.
struct SlotGuard {
    slots: SlotTable,
    sbom_id: String,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // 같은 sbom_id로 새 계산이 이미 들어왔다면 그 슬롯은 건드리지 않는다
        self.slots
            .remove_if(&self.sbom_id, |_, slot| slot.generation == self.generation);
        metrics::gauge!(m::ANALYSES_IN_FLIGHT).decrement(1.0);
    }
}

/// 계산에 붙은 호출자 하나
///
/// drop되면 대기자 수를 줄이고, 마지막 대기자였다면 계산을 취소합니다.
struct Waiter {
    slots: SlotTable,
    sbom_id: String,
    outcome: SharedOutcome,
    cancel: CancellationToken,
    waiters: Arc<AtomicUsize>,
}

impl Waiter {
    /// 슬롯에 대기자로 등록합니다. 호출자는 슬롯의 shard lock을 쥐고 있어야 합니다.
    fn register(slots: &SlotTable, sbom_id: &str, slot: &Slot) -> Self {
        slot.waiters.fetch_add(1, Ordering::SeqCst);
        Self {
            slots: Arc::clone(slots),
            sbom_id: sbom_id.to_owned(),
            outcome: slot.outcome.clone(),
            cancel: slot.cancel.clone(),
            waiters: Arc::clone(&slot.waiters),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        // 합류는 shard 쓰기 잠금 아래에서 일어나므로, 읽기 잠금을 쥔 채로
        // 감소와 취소를 수행하면 "0이 된 직후 합류"가 끼어들 수 없다
        let _shard = self.slots.get(&self.sbom_id);
        if self.waiters.fetch_sub(1, Ordering::SeqCst) == 1
            && self.outcome.peek().is_none()
            && !self.cancel.is_cancelled()
        {
            tracing::debug!(sbom_id = %self.sbom_id, "last waiter left, cancelling analysis");
            self.cancel.cancel();
        }
    }
}

struct Inner<S, R> {
    config: Arc<AnalyzerConfig>,
    source: BoundedSource<S>,
    cache: ResultCache<R>,
    slots: SlotTable,
    generation: AtomicU64,
    counters: Arc<Counters>,
}

/// SBOM 취약점 분석기
///
/// 복제 비용이 낮으며(`Arc`), 복제본은 캐시, 슬롯 테이블, 질의 예산을 공유합니다.
///
/// # 사용 예시
///
/// ```ignore
/// let analyzer = VulnerabilityAnalyzer::new(
///     AnalyzerConfig::default(),
///     StaticSource::from_json(db_json)?,
///     MemoryResultStore::new(),
/// )?;
/// let report = analyzer
///     .analyze("sbom-1", &components, Duration::from_secs(3600))
///     .await?;
/// println!("{} findings", report.result.findings.len());
/// ```
pub struct VulnerabilityAnalyzer<S, R> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for VulnerabilityAnalyzer<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: VulnerabilitySource, R: ResultStore> VulnerabilityAnalyzer<S, R> {
    /// 분석기를 생성합니다.
    ///
    /// # Errors
    ///
    /// 설정이 유효하지 않으면 `AnalyzerError::Config`
    pub fn new(config: AnalyzerConfig, source: S, store: R) -> Result<Self, AnalyzerError> {
        config.validate()?;
        m::describe_all();

        tracing::info!(
            source = source.name(),
            max_concurrent_queries = config.max_concurrent_queries,
            max_attempts = config.max_attempts,
            "vulnerability analyzer created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                source: BoundedSource::new(source, config.max_concurrent_queries),
                config: Arc::new(config),
                cache: ResultCache::new(store),
                slots: Arc::new(DashMap::new()),
                generation: AtomicU64::new(0),
                counters: Arc::new(Counters::default()),
            }),
        })
    }

    /// 분석기 설정
    pub fn config(&self) -> &AnalyzerConfig {
        &self.inner.config
    }

    /// 취약점 소스
    pub fn source(&self) -> &S {
        self.inner.source.inner()
    }

    /// 결과 저장소
    pub fn store(&self) -> &R {
        self.inner.cache.store()
    }

    /// 설정의 기본 freshness로 분석합니다.
    pub async fn analyze_default(
        &self,
        sbom_id: &str,
        components: &[RawComponent],
    ) -> Result<AnalysisReport, AnalyzerError> {
        let freshness = self.inner.config.default_freshness();
        self.analyze(sbom_id, components, freshness).await
    }

    /// SBOM 하나를 분석합니다.
    ///
    /// `freshness`가 0이면 항상 재계산하고, `Duration::MAX`면 저장된 결과가 있는 한 재사용합니다.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`, `InvalidComponent`, `TooManyComponents`: 외부 호출 전에 실패
    /// - `Aborted`: 계산이 취소됨
    /// - `Internal`: 계산 태스크가 비정상 종료됨
    ///
    /// 컴포넌트별 조회 실패는 에러가 아니라 `Unknown` finding으로 보고됩니다.
    pub async fn analyze(
        &self,
        sbom_id: &str,
        components: &[RawComponent],
        freshness: Duration,
    ) -> Result<AnalysisReport, AnalyzerError> {
        validate_sbom_id(sbom_id)?;
        let plan = ComponentPlan::build(components, self.inner.config.max_components)?;

        if let Some(result) = self.cached(sbom_id, freshness).await {
            metrics::counter!(m::ANALYSES_TOTAL, m::LABEL_ORIGIN => "cache").increment(1);
            return Ok(AnalysisReport {
                result,
                origin: ResultOrigin::Cache,
                cache_warning: None,
            });
        }

        let (waiter, mut origin) = self.attach(sbom_id, plan, freshness);
        let computed = waiter.outcome.clone().await?;
        drop(waiter);

        if computed.from_cache && origin == ResultOrigin::Computed {
            origin = ResultOrigin::Cache;
        }
        metrics::counter!(m::ANALYSES_TOTAL, m::LABEL_ORIGIN => origin.as_str()).increment(1);

        Ok(AnalysisReport {
            result: computed.result,
            origin,
            cache_warning: computed.cache_warning,
        })
    }

    /// deadline 안에 분석합니다.
    ///
    /// deadline이 지나면 이 호출자만 분리되며 `Aborted`를 반환합니다.
    /// 다른 대기자가 남아있으면 계산은 계속됩니다.
    pub async fn analyze_with_deadline(
        &self,
        sbom_id: &str,
        components: &[RawComponent],
        freshness: Duration,
        deadline: Duration,
    ) -> Result<AnalysisReport, AnalyzerError> {
        match tokio::time::timeout(deadline, self.analyze(sbom_id, components, freshness)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    sbom_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "analysis deadline exceeded"
                );
                Err(AnalyzerError::Aborted {
                    sbom_id: sbom_id.to_owned(),
                    reason: format!("deadline of {}ms exceeded", deadline.as_millis()),
                })
            }
        }
    }

    /// 저장된 결과를 제거하여 다음 호출이 재계산하도록 합니다.
    pub async fn invalidate_cache(&self, sbom_id: &str) -> Result<(), AnalyzerError> {
        validate_sbom_id(sbom_id)?;
        self.inner.cache.invalidate(sbom_id).await?;
        tracing::info!(sbom_id, "cached result invalidated");
        Ok(())
    }

    /// 진행 중인 계산 수
    pub fn in_flight(&self) -> usize {
        self.inner.slots.len()
    }

    /// 누적 통계
    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            analyses_completed: self.inner.counters.analyses_completed.load(Ordering::Relaxed),
            queries_issued: self.inner.counters.queries_issued.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }

    async fn cached(&self, sbom_id: &str, freshness: Duration) -> Option<SharedResult> {
        match self.inner.cache.get(sbom_id, freshness).await {
            Ok(Some(result)) => {
                metrics::counter!(m::CACHE_HITS_TOTAL).increment(1);
                tracing::debug!(sbom_id, analysis_id = %result.analysis_id, "cache hit");
                Some(result)
            }
            Ok(None) => {
                metrics::counter!(m::CACHE_MISSES_TOTAL).increment(1);
                None
            }
            Err(e) => {
                metrics::counter!(m::CACHE_MISSES_TOTAL).increment(1);
                tracing::warn!(sbom_id, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// 진행 중인 계산에 합류하거나 새 계산을 시작합니다.
    fn attach(
        &self,
        sbom_id: &str,
        plan: ComponentPlan,
        freshness: Duration,
    ) -> (Waiter, ResultOrigin) {
        let slots = &self.inner.slots;
        match slots.entry(sbom_id.to_owned()) {
            Entry::Occupied(entry) if !entry.get().cancel.is_cancelled() => {
                tracing::debug!(sbom_id, "joining in-flight analysis");
                (Waiter::register(slots, sbom_id, entry.get()), ResultOrigin::Joined)
            }
            Entry::Occupied(mut entry) => {
                let slot = self.spawn(sbom_id, plan, freshness);
                let waiter = Waiter::register(slots, sbom_id, &slot);
                entry.insert(slot);
                (waiter, ResultOrigin::Computed)
            }
            Entry::Vacant(entry) => {
                let slot = self.spawn(sbom_id, plan, freshness);
                let waiter = Waiter::register(slots, sbom_id, &slot);
                entry.insert(slot);
                (waiter, ResultOrigin::Computed)
            }
        }
    }

    fn spawn(&self, sbom_id: &str, plan: ComponentPlan, freshness: Duration) -> Slot {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let guard = SlotGuard {
            slots: Arc::clone(&self.inner.slots),
            sbom_id: sbom_id.to_owned(),
            generation,
        };
        metrics::gauge!(m::ANALYSES_IN_FLIGHT).increment(1.0);

        tracing::info!(
            sbom_id,
            unique_components = plan.unique_count(),
            total_entries = plan.total_entries(),
            "starting analysis"
        );

        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let id = sbom_id.to_owned();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    metrics::counter!(m::ANALYSES_ABORTED_TOTAL).increment(1);
                    tracing::info!(sbom_id = %id, "analysis cancelled, nothing published");
                    Err(AnalyzerError::Aborted {
                        sbom_id: id,
                        reason: "all callers left".to_owned(),
                    })
                }
                outcome = compute(inner, id.clone(), plan, freshness) => outcome,
            }
        });

        let outcome = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AnalyzerError::Internal(format!("analysis task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        Slot {
            generation,
            outcome,
            cancel,
            waiters: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// 계산 본체: 캐시 재확인, 팬아웃, 집계, 게시
async fn compute<S: VulnerabilitySource, R: ResultStore>(
    inner: Arc<Inner<S, R>>,
    sbom_id: String,
    plan: ComponentPlan,
    freshness: Duration,
) -> Result<Computed, AnalyzerError> {
    // 슬롯을 얻기 전에 다른 계산이 게시했을 수 있다
    if let Ok(Some(result)) = inner.cache.get(&sbom_id, freshness).await {
        return Ok(Computed {
            result,
            cache_warning: None,
            from_cache: true,
        });
    }

    let started = Instant::now();
    let total_entries = plan.total_entries();
    let unique = plan.unique_count();

    let mut pending: FuturesUnordered<_> = plan
        .into_entries()
        .map(|(key, occurrence)| {
            let source = inner.source.clone();
            let config = Arc::clone(&inner.config);
            let counters = Arc::clone(&inner.counters);
            async move {
                let status = lookup(&source, &config, &counters, &key).await;
                ComponentFinding::new(key, occurrence, status)
            }
        })
        .collect();

    let mut findings = Vec::with_capacity(unique);
    while let Some(finding) = pending.next().await {
        findings.push(finding);
    }

    let result = AnalysisResult::assemble(sbom_id.as_str(), findings, total_entries);
    let elapsed = started.elapsed();

    metrics::histogram!(m::ANALYSIS_DURATION_SECONDS).record(elapsed.as_secs_f64());
    metrics::counter!(m::COMPONENTS_ANALYZED_TOTAL).increment(unique as u64);
    metrics::counter!(m::UNKNOWN_FINDINGS_TOTAL).increment(result.unknown_count() as u64);
    for severity in defectdetect_core::types::Severity::ALL {
        let count = result.severity_summary.get(severity);
        if count > 0 {
            metrics::counter!(
                m::VULNERABILITIES_MATCHED_TOTAL,
                m::LABEL_SEVERITY => severity.as_str()
            )
            .increment(count as u64);
        }
    }

    let (result, saved) = inner.cache.put(result).await;
    let cache_warning = match saved {
        Ok(()) => None,
        Err(e) => {
            metrics::counter!(m::CACHE_WRITE_FAILURES_TOTAL).increment(1);
            tracing::warn!(sbom_id = %sbom_id, error = %e, "failed to store analysis result");
            Some(e)
        }
    };

    inner.counters.analyses_completed.fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        sbom_id = %sbom_id,
        analysis_id = %result.analysis_id,
        components = unique,
        vulnerable = result.vulnerable_count(),
        unknown = result.unknown_count(),
        critical = result.severity_summary.critical,
        high = result.severity_summary.high,
        duration_ms = elapsed.as_millis() as u64,
        "analysis completed"
    );

    Ok(Computed {
        result,
        cache_warning,
        from_cache: false,
    })
}

/// 키 하나를 재시도 정책에 따라 조회하고 매칭합니다.
async fn lookup<S: VulnerabilitySource>(
    source: &BoundedSource<S>,
    config: &AnalyzerConfig,
    counters: &Counters,
    key: &ComponentKey,
) -> FindingStatus {
    let source_name = source.inner().name().to_owned();
    let mut attempt = 1;

    loop {
        let started = Instant::now();
        let outcome = source.query_within(key, config.query_timeout()).await;
        counters.queries_issued.fetch_add(1, Ordering::Relaxed);
        metrics::histogram!(
            m::SOURCE_QUERY_DURATION_SECONDS,
            m::LABEL_SOURCE => source_name.clone()
        )
        .record(started.elapsed().as_secs_f64());

        let err = match outcome {
            Ok(records) => {
                metrics::counter!(
                    m::SOURCE_QUERIES_TOTAL,
                    m::LABEL_SOURCE => source_name.clone(),
                    m::LABEL_RESULT => "ok"
                )
                .increment(1);
                return FindingStatus::assessed(match_records(key, records));
            }
            Err(err) => err,
        };

        metrics::counter!(
            m::SOURCE_QUERIES_TOTAL,
            m::LABEL_SOURCE => source_name.clone(),
            m::LABEL_RESULT => err.kind()
        )
        .increment(1);

        if !err.is_retryable() || attempt >= config.max_attempts {
            tracing::warn!(
                component = %key,
                attempts = attempt,
                error = %err,
                "vulnerability lookup failed, status unknown"
            );
            return FindingStatus::Unknown {
                reason: unknown_reason(&err, attempt),
            };
        }

        let backoff = retry_delay(config, attempt, &err);
        tracing::debug!(
            component = %key,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "retrying vulnerability lookup"
        );
        metrics::counter!(m::SOURCE_RETRIES_TOTAL, m::LABEL_SOURCE => source_name.clone())
            .increment(1);
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// 다음 재시도까지의 대기 시간
///
/// 서버가 지정한 `Retry-After`를 따르되 `retry_backoff_max_ms`를 넘지 않습니다.
fn retry_delay(config: &AnalyzerConfig, attempt: u32, err: &SourceError) -> Duration {
    let backoff = config.backoff_for(attempt);
    let ceiling = Duration::from_millis(config.retry_backoff_max_ms);
    err.retry_after()
        .map_or(backoff, |after| backoff.max(after))
        .min(ceiling)
}

fn unknown_reason(err: &SourceError, attempts: u32) -> String {
    if err.is_retryable() {
        format!("{err} (after {attempts} attempts)")
    } else {
        err.to_string()
    }
}

/// 레코드 중 키의 버전에 영향을 주는 것만 남깁니다.
fn match_records(
    key: &ComponentKey,
    records: Vec<VulnerabilityRecord>,
) -> Vec<MatchedVulnerability> {
    records
        .into_iter()
        .filter_map(|record| {
            let outcome = affected_by(&key.version, &record.affected_ranges, &key.ecosystem);
            outcome.affected.then(|| MatchedVulnerability {
                record,
                confidence: outcome.confidence,
            })
        })
        .collect()
}
