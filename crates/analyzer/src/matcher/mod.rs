//! 버전 범위 매칭 -- 에코시스템별 비교 규칙
//!
//! 컴포넌트 버전이 취약점의 영향 범위에 포함되는지 판정합니다.
//! 비교 규칙은 에코시스템으로 결정되는 [`VersionScheme`]을 따릅니다.
//!
//! # 매칭 규칙
//!
//! - `introduced`: 포함. 없거나 `"0"`이면 하한 없음
//! - `fixed`: 제외
//! - `last_affected`: 포함
//! - 상한이 없으면 이후 모든 버전이 영향받음
//! - `Enumerated`: 스킴 기준 동일 버전
//!
//! 스킴이 버전을 파싱하지 못하면 바이트 단위 문자열 비교로 대체하고,
//! 결과의 신뢰도를 [`MatchConfidence::Reduced`]로 낮춥니다.

mod dpkg;
mod pep440;
mod semantic;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::source::VersionRange;

/// 에코시스템별 버전 비교 스킴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionScheme {
    /// SemVer 2.0 (관대한 파싱)
    SemVer,
    /// Python PEP 440
    Pep440,
    /// Debian dpkg
    Debian,
    /// 바이트 단위 문자열 비교
    Lexicographic,
}

impl VersionScheme {
    /// 정규화된 에코시스템 이름으로 스킴을 결정합니다.
    pub fn for_ecosystem(ecosystem: &str) -> Self {
        match ecosystem {
            "npm" | "cargo" | "go" | "nuget" | "hex" | "pub" | "packagist" => Self::SemVer,
            "pypi" => Self::Pep440,
            "debian" | "ubuntu" => Self::Debian,
            _ => Self::Lexicographic,
        }
    }

    /// 두 버전을 비교합니다. 파싱에 실패하면 `None`
    fn compare(self, a: &str, b: &str) -> Option<Ordering> {
        match self {
            Self::SemVer => semantic::compare(a, b),
            Self::Pep440 => pep440::compare(a, b),
            Self::Debian => dpkg::compare(a, b),
            Self::Lexicographic => None,
        }
    }
}

/// 매칭 결과의 신뢰도
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchConfidence {
    /// 에코시스템 규칙으로 비교함
    #[default]
    Exact,
    /// 문자열 비교로 대체함
    Reduced,
}

/// 단일 범위 매칭 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// 영향 여부
    pub affected: bool,
    /// 판정 신뢰도
    pub confidence: MatchConfidence,
}

/// 비교 한 번의 결과와 신뢰도를 누적하는 도우미
struct Comparator {
    scheme: VersionScheme,
    confidence: MatchConfidence,
}

impl Comparator {
    fn new(scheme: VersionScheme) -> Self {
        let confidence = match scheme {
            VersionScheme::Lexicographic => MatchConfidence::Reduced,
            _ => MatchConfidence::Exact,
        };
        Self { scheme, confidence }
    }

    fn cmp(&mut self, a: &str, b: &str) -> Ordering {
        match self.scheme.compare(a, b) {
            Some(ordering) => ordering,
            None => {
                self.confidence = MatchConfidence::Reduced;
                a.as_bytes().cmp(b.as_bytes())
            }
        }
    }
}

/// 버전이 범위에 포함되는지 판정합니다.
pub fn matches(version: &str, range: &VersionRange, ecosystem: &str) -> MatchOutcome {
    let mut cmp = Comparator::new(VersionScheme::for_ecosystem(ecosystem));

    let affected = match range {
        VersionRange::Interval {
            introduced,
            fixed,
            last_affected,
        } => {
            let lower_ok = match introduced.as_deref() {
                None | Some("0") => true,
                Some(intro) => cmp.cmp(version, intro) != Ordering::Less,
            };
            // 하한을 벗어나면 상한 비교는 결과에 영향이 없다
            lower_ok
                && fixed
                    .as_deref()
                    .is_none_or(|fix| cmp.cmp(version, fix) == Ordering::Less)
                && last_affected
                    .as_deref()
                    .is_none_or(|last| cmp.cmp(version, last) != Ordering::Greater)
        }
        VersionRange::Enumerated { versions } => versions
            .iter()
            .any(|v| cmp.cmp(version, v) == Ordering::Equal),
    };

    MatchOutcome {
        affected,
        confidence: cmp.confidence,
    }
}

/// 범위 중 하나라도 버전을 포함하면 영향받는 것으로 판정합니다.
///
/// 범위가 비어있으면 영향 없음입니다. 영향받는 경우 신뢰도는 처음 매칭된 범위의 것을,
/// 영향받지 않는 경우 평가한 범위 중 가장 낮은 신뢰도를 반환합니다.
pub fn affected_by(version: &str, ranges: &[VersionRange], ecosystem: &str) -> MatchOutcome {
    let mut confidence = match VersionScheme::for_ecosystem(ecosystem) {
        VersionScheme::Lexicographic => MatchConfidence::Reduced,
        _ => MatchConfidence::Exact,
    };

    for range in ranges {
        let outcome = matches(version, range, ecosystem);
        if outcome.affected {
            return outcome;
        }
        confidence = confidence.max(outcome.confidence);
    }

    MatchOutcome {
        affected: false,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(introduced: Option<&str>, fixed: Option<&str>) -> VersionRange {
        VersionRange::interval(introduced, fixed)
    }

    fn last_affected(introduced: Option<&str>, last: &str) -> VersionRange {
        VersionRange::Interval {
            introduced: introduced.map(str::to_owned),
            fixed: None,
            last_affected: Some(last.to_owned()),
        }
    }

    #[test]
    fn scheme_for_ecosystem() {
        assert_eq!(VersionScheme::for_ecosystem("npm"), VersionScheme::SemVer);
        assert_eq!(VersionScheme::for_ecosystem("cargo"), VersionScheme::SemVer);
        assert_eq!(VersionScheme::for_ecosystem("pypi"), VersionScheme::Pep440);
        assert_eq!(VersionScheme::for_ecosystem("ubuntu"), VersionScheme::Debian);
        assert_eq!(VersionScheme::for_ecosystem("maven"), VersionScheme::Lexicographic);
        assert_eq!(VersionScheme::for_ecosystem("generic"), VersionScheme::Lexicographic);
    }

    #[test]
    fn affected_in_range() {
        let ranges = vec![interval(Some("1.0.0"), Some("1.0.5"))];
        assert!(affected_by("1.0.0", &ranges, "npm").affected);
        assert!(affected_by("1.0.3", &ranges, "npm").affected);
        assert!(affected_by("1.0.4", &ranges, "npm").affected);
    }

    #[test]
    fn not_affected_before_range() {
        let ranges = vec![interval(Some("1.0.0"), Some("1.0.5"))];
        assert!(!affected_by("0.9.9", &ranges, "npm").affected);
    }

    #[test]
    fn fixed_is_exclusive() {
        let ranges = vec![interval(Some("1.0.0"), Some("1.0.5"))];
        let outcome = affected_by("1.0.5", &ranges, "npm");
        assert!(!outcome.affected);
        assert_eq!(outcome.confidence, MatchConfidence::Exact);
        assert!(!affected_by("2.0.0", &ranges, "npm").affected);
    }

    #[test]
    fn no_lower_bound_and_zero_introduced() {
        let ranges = vec![interval(None, Some("2.0.0"))];
        assert!(affected_by("0.0.1", &ranges, "cargo").affected);

        let ranges = vec![interval(Some("0"), Some("2.0.0"))];
        assert!(affected_by("0.0.1", &ranges, "cargo").affected);
        assert!(!affected_by("2.0.0", &ranges, "cargo").affected);
    }

    #[test]
    fn open_ended_range() {
        let ranges = vec![interval(Some("1.0.0"), None)];
        assert!(affected_by("1.0.0", &ranges, "npm").affected);
        assert!(affected_by("99.0.0", &ranges, "npm").affected);
        assert!(!affected_by("0.9.0", &ranges, "npm").affected);
    }

    #[test]
    fn last_affected_is_inclusive() {
        let ranges = vec![last_affected(Some("1.0.0"), "1.2.0")];
        assert!(affected_by("1.2.0", &ranges, "npm").affected);
        assert!(!affected_by("1.2.1", &ranges, "npm").affected);
    }

    #[test]
    fn multiple_ranges_any_matches() {
        let ranges = vec![
            interval(Some("1.0.0"), Some("1.0.5")),
            interval(Some("2.0.0"), Some("2.0.3")),
        ];
        assert!(affected_by("1.0.2", &ranges, "npm").affected);
        assert!(affected_by("2.0.1", &ranges, "npm").affected);
        assert!(!affected_by("1.5.0", &ranges, "npm").affected);
    }

    #[test]
    fn empty_ranges_never_match() {
        assert!(!affected_by("1.0.0", &[], "npm").affected);
    }

    #[test]
    fn semver_prerelease_ordering() {
        let ranges = vec![interval(Some("1.0.0"), Some("1.0.1"))];
        assert!(!affected_by("1.0.0-alpha", &ranges, "npm").affected);
        assert!(affected_by("1.0.1-rc.1", &ranges, "npm").affected);
    }

    #[test]
    fn semver_tolerates_go_prefix() {
        let ranges = vec![interval(Some("v1.2.0"), Some("v1.2.5"))];
        let outcome = affected_by("v1.2.3", &ranges, "go");
        assert!(outcome.affected);
        assert_eq!(outcome.confidence, MatchConfidence::Exact);
    }

    #[test]
    fn pep440_uses_python_ordering() {
        let ranges = vec![interval(Some("4.0"), Some("4.2.2"))];
        assert!(affected_by("4.2.2rc1", &ranges, "pypi").affected);
        assert!(!affected_by("4.2.2", &ranges, "pypi").affected);
        assert!(!affected_by("4.0.dev1", &ranges, "pypi").affected);
    }

    #[test]
    fn debian_uses_dpkg_ordering() {
        let ranges = vec![interval(None, Some("1.1.1n-0+deb11u5"))];
        assert!(affected_by("1.1.1n-0+deb11u4", &ranges, "debian").affected);
        assert!(!affected_by("1:1.0-1", &ranges, "debian").affected);
        assert!(affected_by("1.1.1n~rc1-0", &ranges, "debian").affected);
    }

    #[test]
    fn enumerated_uses_scheme_equality() {
        let ranges = vec![VersionRange::enumerated(["1.0", "1.1.0"])];
        let outcome = affected_by("1.0.0", &ranges, "npm");
        assert!(outcome.affected);
        assert_eq!(outcome.confidence, MatchConfidence::Exact);
        assert!(!affected_by("1.2.0", &ranges, "npm").affected);
    }

    #[test]
    fn unparseable_version_falls_back_with_reduced_confidence() {
        let ranges = vec![interval(Some("1.0.0"), Some("2.0.0"))];
        let outcome = affected_by("1.5.0-custom_build!", &ranges, "npm");
        assert!(outcome.affected);
        assert_eq!(outcome.confidence, MatchConfidence::Reduced);
    }

    #[test]
    fn lexicographic_ecosystem_is_always_reduced() {
        let ranges = vec![interval(Some("1.0"), Some("2.0"))];
        let outcome = affected_by("1.5", &ranges, "maven");
        assert!(outcome.affected);
        assert_eq!(outcome.confidence, MatchConfidence::Reduced);

        let outcome = affected_by("3.0", &ranges, "generic");
        assert!(!outcome.affected);
        assert_eq!(outcome.confidence, MatchConfidence::Reduced);
    }
}
