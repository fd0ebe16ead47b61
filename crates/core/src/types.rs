//! 공통 도메인 타입

use std::fmt;

use serde::{Deserialize, Serialize};

/// 취약점 심각도
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`None < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// 심각도 정보 없음
    #[default]
    None,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    #[serde(alias = "MODERATE")]
    Medium,
    /// 높은 심각도
    High,
    /// 치명적
    Critical,
}

impl Severity {
    /// 모든 심각도 (낮은 순)
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다. GitHub Advisory의 `MODERATE`는 `Medium`으로 매핑됩니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "unknown" | "info" | "informational" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// CVSS 기본 점수(0.0-10.0)를 심각도로 변환합니다.
    ///
    /// CVSS v3 정성 등급 기준: 0.0 None, 0.1-3.9 Low, 4.0-6.9 Medium,
    /// 7.0-8.9 High, 9.0-10.0 Critical
    pub fn from_cvss_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::None
        }
    }

    /// 메트릭 레이블 등에 사용하는 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::None < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_default_is_none() {
        assert_eq!(Severity::default(), Severity::None);
    }

    #[test]
    fn severity_display() {
        assert_eq!(Severity::None.to_string(), "None");
        assert_eq!(Severity::Critical.to_string(), "Critical");
    }

    #[test]
    fn severity_from_str_loose() {
        assert_eq!(Severity::from_str_loose("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_str_loose("Moderate"), Some(Severity::Medium));
        assert_eq!(Severity::from_str_loose(" crit "), Some(Severity::Critical));
        assert_eq!(Severity::from_str_loose("low"), Some(Severity::Low));
        assert_eq!(Severity::from_str_loose("unknown"), Some(Severity::None));
        assert_eq!(Severity::from_str_loose("severe"), None);
    }

    #[test]
    fn severity_from_cvss_score_boundaries() {
        assert_eq!(Severity::from_cvss_score(0.0), Severity::None);
        assert_eq!(Severity::from_cvss_score(0.1), Severity::Low);
        assert_eq!(Severity::from_cvss_score(3.9), Severity::Low);
        assert_eq!(Severity::from_cvss_score(4.0), Severity::Medium);
        assert_eq!(Severity::from_cvss_score(7.0), Severity::High);
        assert_eq!(Severity::from_cvss_score(9.8), Severity::Critical);
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
        let parsed: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(parsed, Severity::Critical);
        let parsed: Severity = serde_json::from_str("\"MODERATE\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn all_is_sorted_ascending() {
        for pair in Severity::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
