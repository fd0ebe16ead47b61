//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 분석기는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `defectdetect_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! 레코더가 설치되지 않은 경우 모든 호출은 no-op입니다.

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (none, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 에코시스템 레이블 키 (npm, pypi, ...)
pub const LABEL_ECOSYSTEM: &str = "ecosystem";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 분석 결과 출처 레이블 키 (cache, computed, joined)
pub const LABEL_ORIGIN: &str = "origin";

/// 취약점 소스 이름 레이블 키 (osv, static)
pub const LABEL_SOURCE: &str = "source";

// ─── Analyzer 메트릭 ────────────────────────────────────────────────

/// 분석 요청 수 (counter, label: origin)
pub const ANALYSES_TOTAL: &str = "defectdetect_analyses_total";

/// 실제 계산된 분석의 소요 시간 (histogram, 초)
pub const ANALYSIS_DURATION_SECONDS: &str = "defectdetect_analysis_duration_seconds";

/// 진행 중인 분석 수 (gauge)
pub const ANALYSES_IN_FLIGHT: &str = "defectdetect_analyses_in_flight";

/// 중단된 분석 수 (counter)
pub const ANALYSES_ABORTED_TOTAL: &str = "defectdetect_analyses_aborted_total";

/// 분석된 고유 컴포넌트 수 (counter)
pub const COMPONENTS_ANALYZED_TOTAL: &str = "defectdetect_components_analyzed_total";

/// 상태 불명(Unknown)으로 판정된 컴포넌트 수 (counter)
pub const UNKNOWN_FINDINGS_TOTAL: &str = "defectdetect_unknown_findings_total";

/// 매칭된 취약점 수 (counter, label: severity)
pub const VULNERABILITIES_MATCHED_TOTAL: &str = "defectdetect_vulnerabilities_matched_total";

// ─── Source 메트릭 ─────────────────────────────────────────────────

/// 취약점 소스 질의 수 (counter, labels: source, result)
pub const SOURCE_QUERIES_TOTAL: &str = "defectdetect_source_queries_total";

/// 취약점 소스 재시도 수 (counter, label: source)
pub const SOURCE_RETRIES_TOTAL: &str = "defectdetect_source_retries_total";

/// 취약점 소스 질의 지연 시간 (histogram, 초)
pub const SOURCE_QUERY_DURATION_SECONDS: &str = "defectdetect_source_query_duration_seconds";

// ─── Cache 메트릭 ──────────────────────────────────────────────────

/// 캐시 적중 수 (counter)
pub const CACHE_HITS_TOTAL: &str = "defectdetect_cache_hits_total";

/// 캐시 미스 수 (counter)
pub const CACHE_MISSES_TOTAL: &str = "defectdetect_cache_misses_total";

/// 결과 저장 실패 수 (counter)
pub const CACHE_WRITE_FAILURES_TOTAL: &str = "defectdetect_cache_write_failures_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 소스 질의 지연 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 30s 범위 (원격 HTTP 질의)
pub const QUERY_DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0, 30.0];

/// 분석 소요 시간 히스토그램 버킷 (초)
pub const ANALYSIS_DURATION_BUCKETS: [f64; 9] =
    [0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        ANALYSES_TOTAL,
        "Total number of analysis requests, labelled by result origin"
    );
    describe_histogram!(
        ANALYSIS_DURATION_SECONDS,
        "Time to compute a single SBOM analysis in seconds"
    );
    describe_gauge!(
        ANALYSES_IN_FLIGHT,
        "Number of analyses currently holding a single-flight slot"
    );
    describe_counter!(
        ANALYSES_ABORTED_TOTAL,
        "Total number of analyses cancelled before completion"
    );
    describe_counter!(
        COMPONENTS_ANALYZED_TOTAL,
        "Total number of unique components analyzed"
    );
    describe_counter!(
        UNKNOWN_FINDINGS_TOTAL,
        "Total number of components whose status could not be determined"
    );
    describe_counter!(
        VULNERABILITIES_MATCHED_TOTAL,
        "Total number of matched vulnerabilities by severity"
    );

    describe_counter!(
        SOURCE_QUERIES_TOTAL,
        "Total number of vulnerability source query attempts"
    );
    describe_counter!(
        SOURCE_RETRIES_TOTAL,
        "Total number of retried vulnerability source queries"
    );
    describe_histogram!(
        SOURCE_QUERY_DURATION_SECONDS,
        "Vulnerability source query latency in seconds"
    );

    describe_counter!(CACHE_HITS_TOTAL, "Total number of result cache hits");
    describe_counter!(CACHE_MISSES_TOTAL, "Total number of result cache misses");
    describe_counter!(
        CACHE_WRITE_FAILURES_TOTAL,
        "Total number of failed result publications"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        ANALYSES_TOTAL,
        ANALYSIS_DURATION_SECONDS,
        ANALYSES_IN_FLIGHT,
        ANALYSES_ABORTED_TOTAL,
        COMPONENTS_ANALYZED_TOTAL,
        UNKNOWN_FINDINGS_TOTAL,
        VULNERABILITIES_MATCHED_TOTAL,
        SOURCE_QUERIES_TOTAL,
        SOURCE_RETRIES_TOTAL,
        SOURCE_QUERY_DURATION_SECONDS,
        CACHE_HITS_TOTAL,
        CACHE_MISSES_TOTAL,
        CACHE_WRITE_FAILURES_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("defectdetect_"),
                "Metric '{}' does not start with 'defectdetect_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        let labels = [
            LABEL_SEVERITY,
            LABEL_ECOSYSTEM,
            LABEL_RESULT,
            LABEL_ORIGIN,
            LABEL_SOURCE,
        ];
        for label in &labels {
            assert_eq!(label.to_lowercase(), *label);
        }
    }

    #[test]
    fn duration_buckets_are_sorted() {
        for buckets in [&QUERY_DURATION_BUCKETS[..], &ANALYSIS_DURATION_BUCKETS[..]] {
            for i in 1..buckets.len() {
                assert!(
                    buckets[i] > buckets[i - 1],
                    "Bucket values must be in ascending order"
                );
            }
        }
    }
}
