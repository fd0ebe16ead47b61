//! 분석 결과 타입
//!
//! [`AnalysisResult`]는 한 SBOM의 분석 결과 스냅샷입니다. 계산이 끝나면
//! `Arc`로 캐시와 모든 대기자가 불변으로 공유합니다.

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use defectdetect_core::types::Severity;

use crate::component::{ComponentKey, Occurrence, RawComponent, normalize};
use crate::error::AnalyzerError;
use crate::matcher::MatchConfidence;
use crate::source::VulnerabilityRecord;

/// 컴포넌트에 매칭된 취약점
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedVulnerability {
    /// 소스가 반환한 레코드
    pub record: VulnerabilityRecord,
    /// 버전 매칭 신뢰도
    pub confidence: MatchConfidence,
}

/// 컴포넌트 판정 상태
///
/// `Assessed { vulnerabilities: [] }`는 "알려진 취약점 없음",
/// `Unknown`은 "조회 실패로 알 수 없음"이며 둘은 구분됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FindingStatus {
    /// 조회 성공
    Assessed {
        /// ID 순으로 정렬된 취약점 (중복 없음)
        vulnerabilities: Vec<MatchedVulnerability>,
    },
    /// 조회 실패
    Unknown {
        /// 실패 사유
        reason: String,
    },
}

impl FindingStatus {
    /// 매칭된 취약점들로 `Assessed`를 만듭니다. ID 기준으로 정렬하고 중복을 제거합니다.
    pub fn assessed(mut vulnerabilities: Vec<MatchedVulnerability>) -> Self {
        vulnerabilities.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        vulnerabilities.dedup_by(|a, b| a.record.id == b.record.id);
        Self::Assessed { vulnerabilities }
    }

    /// 조회 실패 여부
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    /// 매칭된 취약점 (Unknown이면 빈 슬라이스)
    pub fn vulnerabilities(&self) -> &[MatchedVulnerability] {
        match self {
            Self::Assessed { vulnerabilities } => vulnerabilities,
            Self::Unknown { .. } => &[],
        }
    }
}

/// 고유 컴포넌트 키 하나에 대한 판정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentFinding {
    /// 정규화된 키
    pub component: ComponentKey,
    /// 이 키를 가진 SBOM 엔트리 수
    pub occurrences: usize,
    /// 이 키를 가진 SBOM 엔트리 식별자
    pub entry_refs: Vec<String>,
    /// 판정 상태
    #[serde(flatten)]
    pub status: FindingStatus,
}

impl ComponentFinding {
    /// 키, 엔트리 정보, 상태로 finding을 생성합니다.
    pub fn new(component: ComponentKey, occurrence: Occurrence, status: FindingStatus) -> Self {
        Self {
            component,
            occurrences: occurrence.count,
            entry_refs: occurrence.entry_refs,
            status,
        }
    }
}

/// 심각도별 (컴포넌트, 취약점) 쌍 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// 치명적
    pub critical: usize,
    /// 높음
    pub high: usize,
    /// 중간
    pub medium: usize,
    /// 낮음
    pub low: usize,
    /// 심각도 없음 (점수 미상 포함)
    pub none: usize,
}

impl SeverityCounts {
    /// finding 목록에서 집계합니다. Unknown finding은 세지 않습니다.
    pub fn tally(findings: &[ComponentFinding]) -> Self {
        let mut counts = Self::default();
        for vuln in findings.iter().flat_map(|f| f.status.vulnerabilities()) {
            counts.record(vuln.record.severity);
        }
        counts
    }

    fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::None => self.none += 1,
        }
    }

    /// 심각도별 개수
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::None => self.none,
        }
    }

    /// 전체 개수
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.none
    }
}

/// SBOM 한 건의 분석 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 분석 실행 ID
    pub analysis_id: Uuid,
    /// 대상 SBOM
    pub sbom_id: String,
    /// 키 순으로 정렬된 finding (키 중복 없음)
    pub findings: Vec<ComponentFinding>,
    /// 계산 완료 시각
    pub computed_at: SystemTime,
    /// 심각도 요약
    pub severity_summary: SeverityCounts,
    /// 입력 엔트리 수 (중복 포함)
    pub total_entries: usize,
}

impl AnalysisResult {
    /// finding 목록으로 결과를 조립합니다. 키 순으로 정렬하고 요약을 계산합니다.
    pub fn assemble(
        sbom_id: impl Into<String>,
        mut findings: Vec<ComponentFinding>,
        total_entries: usize,
    ) -> Self {
        findings.sort_by(|a, b| a.component.cmp(&b.component));
        findings.dedup_by(|a, b| a.component == b.component);
        let severity_summary = SeverityCounts::tally(&findings);
        Self {
            analysis_id: Uuid::new_v4(),
            sbom_id: sbom_id.into(),
            findings,
            computed_at: SystemTime::now(),
            severity_summary,
            total_entries,
        }
    }

    /// 키로 finding을 찾습니다.
    pub fn finding(&self, key: &ComponentKey) -> Option<&ComponentFinding> {
        self.findings
            .binary_search_by(|f| f.component.cmp(key))
            .ok()
            .map(|idx| &self.findings[idx])
    }

    /// 원본 컴포넌트가 속한 finding을 찾습니다.
    ///
    /// # Errors
    ///
    /// 컴포넌트를 정규화할 수 없으면 `AnalyzerError::InvalidComponent`
    pub fn finding_for(&self, raw: &RawComponent) -> Result<Option<&ComponentFinding>, AnalyzerError> {
        let key = normalize(raw)?;
        Ok(self.finding(&key))
    }

    /// 조회 실패한 finding 수
    pub fn unknown_count(&self) -> usize {
        self.findings.iter().filter(|f| f.status.is_unknown()).count()
    }

    /// 하나 이상의 취약점이 매칭된 finding 수
    pub fn vulnerable_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| !f.status.vulnerabilities().is_empty())
            .count()
    }

    /// 계산 시각 이후 경과 시간. 미래 시각이면 0
    pub fn age(&self, now: SystemTime) -> std::time::Duration {
        now.duration_since(self.computed_at).unwrap_or_default()
    }
}

/// `Arc`로 공유되는 결과
pub type SharedResult = Arc<AnalysisResult>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::source::VersionRange;

    fn key(name: &str) -> ComponentKey {
        ComponentKey::new("npm", name, "1.0.0")
    }

    fn vuln(id: &str, severity: Severity) -> MatchedVulnerability {
        MatchedVulnerability {
            record: VulnerabilityRecord {
                id: id.to_owned(),
                summary: String::new(),
                severity,
                affected_ranges: vec![VersionRange::interval(None, Some("2.0.0"))],
                aliases: vec![],
            },
            confidence: MatchConfidence::Exact,
        }
    }

    fn occurrence(refs: &[&str]) -> Occurrence {
        Occurrence {
            count: refs.len(),
            entry_refs: refs.iter().map(|r| (*r).to_owned()).collect(),
        }
    }

    #[test]
    fn assessed_sorts_and_dedups_by_id() {
        let status = FindingStatus::assessed(vec![
            vuln("GHSA-b", Severity::High),
            vuln("GHSA-a", Severity::Low),
            vuln("GHSA-b", Severity::High),
        ]);
        let ids: Vec<_> = status.vulnerabilities().iter().map(|v| v.record.id.as_str()).collect();
        assert_eq!(ids, vec!["GHSA-a", "GHSA-b"]);
    }

    #[test]
    fn assemble_sorts_findings_and_counts_severity() {
        let findings = vec![
            ComponentFinding::new(
                key("zeta"),
                occurrence(&["#0"]),
                FindingStatus::assessed(vec![vuln("A", Severity::Critical)]),
            ),
            ComponentFinding::new(
                key("alpha"),
                occurrence(&["#1", "#2"]),
                FindingStatus::assessed(vec![vuln("A", Severity::Critical), vuln("B", Severity::Low)]),
            ),
            ComponentFinding::new(
                key("mid"),
                occurrence(&["#3"]),
                FindingStatus::Unknown {
                    reason: "source unavailable".to_owned(),
                },
            ),
        ];

        let result = AnalysisResult::assemble("sbom-1", findings, 4);
        let names: Vec<_> = result.findings.iter().map(|f| f.component.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(result.severity_summary.critical, 2);
        assert_eq!(result.severity_summary.low, 1);
        assert_eq!(result.severity_summary.total(), 3);
        assert_eq!(result.unknown_count(), 1);
        assert_eq!(result.vulnerable_count(), 2);
        assert_eq!(result.total_entries, 4);
    }

    #[test]
    fn finding_for_resolves_raw_component() {
        let result = AnalysisResult::assemble(
            "sbom-1",
            vec![ComponentFinding::new(
                key("lodash"),
                occurrence(&["a", "b"]),
                FindingStatus::assessed(vec![]),
            )],
            2,
        );

        let raw = RawComponent::new("node", " LODASH ", "1.0.0");
        let finding = result.finding_for(&raw).unwrap().unwrap();
        assert_eq!(finding.entry_refs, vec!["a", "b"]);
        assert!(!finding.status.is_unknown());
        assert!(finding.status.vulnerabilities().is_empty());

        let other = RawComponent::new("npm", "express", "1.0.0");
        assert!(result.finding_for(&other).unwrap().is_none());
        assert!(result.finding_for(&RawComponent::new("npm", "", "1.0.0")).is_err());
    }

    #[test]
    fn age_of_future_result_is_zero() {
        let mut result = AnalysisResult::assemble("sbom-1", vec![], 0);
        result.computed_at = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(result.age(SystemTime::now()), Duration::ZERO);
    }

    #[test]
    fn result_roundtrips_through_json() {
        let result = AnalysisResult::assemble(
            "sbom-1",
            vec![ComponentFinding::new(
                key("lodash"),
                occurrence(&["#0"]),
                FindingStatus::Unknown {
                    reason: "rate limited".to_owned(),
                },
            )],
            1,
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":\"unknown\""));
        let parsed: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
