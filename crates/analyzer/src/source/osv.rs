//! OSV 취약점 소스 -- api.osv.dev 질의 클라이언트
//!
//! 패키지 단위(`{"package": {"name", "ecosystem"}}`)로 질의하여 후보 레코드 전체를 받은 뒤,
//! 버전 매칭은 분석기의 matcher가 수행합니다. 응답이 여러 페이지이면
//! `next_page_token`을 따라갑니다.
//!
//! 패키지 이름은 SBOM의 원래 표기([`ComponentKey::package_name`])로 보냅니다.
//! OSV는 Go, NuGet, RubyGems 등에서 이름을 정확히 일치시킵니다.
//!
//! # 에러 분류
//!
//! | 응답 | 결과 |
//! |------|------|
//! | 200 | 레코드 변환 |
//! | 404 | 빈 목록 |
//! | 429 | `RateLimited` (`Retry-After` 초 단위 반영) |
//! | 5xx, 연결 실패, 타임아웃 | `Unavailable` |
//! | 기타 4xx, JSON 해석 실패 | `MalformedResponse` |
//! | `MAX_PAGES` 이후에도 다음 페이지 존재 | `MalformedResponse` |

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use defectdetect_core::types::Severity;

use super::{VersionRange, VulnerabilityRecord, VulnerabilitySource};
use crate::component::ComponentKey;
use crate::error::{AnalyzerError, SourceError};

/// OSV query API 기본 엔드포인트
pub const DEFAULT_ENDPOINT: &str = "https://api.osv.dev/v1/query";

/// 한 질의에서 따라갈 최대 페이지 수
const MAX_PAGES: usize = 10;

/// OSV 원격 소스
pub struct OsvSource {
    client: reqwest::Client,
    endpoint: String,
}

impl OsvSource {
    /// 엔드포인트와 요청 타임아웃으로 클라이언트를 생성합니다.
    ///
    /// # Errors
    ///
    /// HTTP 클라이언트 생성 실패 시 `AnalyzerError::SourceInit`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("defectdetect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyzerError::SourceInit(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// 설정된 엔드포인트
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_page(&self, request: &OsvQueryRequest<'_>) -> Result<OsvQueryResponse, SourceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SourceError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(OsvQueryResponse::default());
        }
        if status.is_server_error() {
            return Err(SourceError::Unavailable(format!("OSV API returned {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::MalformedResponse(format!(
                "OSV API rejected query with {status}"
            )));
        }

        let body = response.bytes().await.map_err(classify_transport_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| SourceError::MalformedResponse(format!("invalid OSV response: {e}")))
    }
}

impl VulnerabilitySource for OsvSource {
    fn name(&self) -> &str {
        "osv"
    }

    async fn query(&self, key: &ComponentKey) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        let ecosystem = osv_ecosystem(&key.ecosystem)
            .ok_or_else(|| SourceError::UnsupportedEcosystem(key.ecosystem.clone()))?;
        let package = key.package_name();

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let request = query_request(package, ecosystem, page_token.as_deref());
            let response = self.fetch_page(&request).await?;

            records.extend(
                response
                    .vulns
                    .iter()
                    .map(|vuln| convert_vulnerability(vuln, package)),
            );

            match response.next_page_token {
                Some(token) if !token.is_empty() => {
                    debug!(component = %key, page, "following OSV next_page_token");
                    page_token = Some(token);
                }
                _ => return Ok(records),
            }
        }

        // 잘린 응답을 완전한 평가로 보고하지 않습니다.
        warn!(
            component = %key,
            pages = MAX_PAGES,
            records = records.len(),
            "OSV response still paginated after page limit"
        );
        Err(SourceError::MalformedResponse(format!(
            "OSV response for {key} truncated after {MAX_PAGES} pages"
        )))
    }
}

fn query_request<'a>(
    name: &'a str,
    ecosystem: &'a str,
    page_token: Option<&'a str>,
) -> OsvQueryRequest<'a> {
    OsvQueryRequest {
        package: OsvPackageRef { name, ecosystem },
        page_token,
    }
}

/// 정규 에코시스템 이름을 OSV 에코시스템 이름으로 변환합니다.
///
/// OSV가 지원하지 않는 에코시스템(`generic` 포함)은 `None`입니다.
pub fn osv_ecosystem(ecosystem: &str) -> Option<&'static str> {
    match ecosystem {
        "npm" => Some("npm"),
        "cargo" => Some("crates.io"),
        "go" => Some("Go"),
        "pypi" => Some("PyPI"),
        "maven" => Some("Maven"),
        "nuget" => Some("NuGet"),
        "rubygems" => Some("RubyGems"),
        "packagist" => Some("Packagist"),
        "hex" => Some("Hex"),
        "pub" => Some("Pub"),
        "debian" => Some("Debian"),
        "ubuntu" => Some("Ubuntu"),
        _ => None,
    }
}

fn classify_transport_error(err: reqwest::Error) -> SourceError {
    if err.is_decode() {
        SourceError::MalformedResponse(err.to_string())
    } else {
        SourceError::Unavailable(err.to_string())
    }
}

// --- OSV API request/response structures ---

#[derive(Debug, Serialize)]
struct OsvQueryRequest<'a> {
    package: OsvPackageRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OsvPackageRef<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct OsvQueryResponse {
    #[serde(default)]
    vulns: Vec<OsvVulnerability>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvVulnerability {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    severity: Vec<OsvSeverity>,
    #[serde(default)]
    database_specific: Option<DatabaseSpecific>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
}

#[derive(Debug, Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    severity_type: String,
    score: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseSpecific {
    #[serde(default)]
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvAffected {
    #[serde(default)]
    package: Option<OsvAffectedPackage>,
    #[serde(default)]
    ranges: Vec<OsvRange>,
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OsvAffectedPackage {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct OsvRange {
    #[serde(rename = "type")]
    range_type: String,
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Debug, Deserialize)]
struct OsvEvent {
    #[serde(default)]
    introduced: Option<String>,
    #[serde(default)]
    fixed: Option<String>,
    #[serde(default)]
    last_affected: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

/// OSV 레코드를 내부 레코드로 변환합니다.
///
/// `affected` 중 질의한 패키지에 해당하는 항목만 사용합니다.
fn convert_vulnerability(vuln: &OsvVulnerability, package: &str) -> VulnerabilityRecord {
    let mut affected_ranges = Vec::new();

    for affected in vuln.affected.iter().filter(|a| {
        a.package
            .as_ref()
            .is_none_or(|p| p.name.eq_ignore_ascii_case(package))
    }) {
        for range in affected.ranges.iter().filter(|r| r.range_type != "GIT") {
            affected_ranges.extend(fold_events(&range.events));
        }
        if !affected.versions.is_empty() {
            affected_ranges.push(VersionRange::Enumerated {
                versions: affected.versions.clone(),
            });
        }
    }

    let summary = vuln
        .summary
        .clone()
        .or_else(|| vuln.details.clone())
        .unwrap_or_default();

    VulnerabilityRecord {
        id: vuln.id.clone(),
        summary,
        severity: severity_of(vuln),
        affected_ranges,
        aliases: vuln.aliases.clone(),
    }
}

/// OSV 이벤트 목록을 구간 목록으로 접습니다.
///
/// `introduced: "0"`은 하한 없음이며, 닫히지 않은 마지막 구간은 상한 없음입니다.
fn fold_events(events: &[OsvEvent]) -> Vec<VersionRange> {
    let mut ranges = Vec::new();
    let mut open: Option<Option<String>> = None;

    for event in events {
        if let Some(introduced) = &event.introduced {
            if let Some(lower) = open.take() {
                ranges.push(VersionRange::Interval {
                    introduced: lower,
                    fixed: None,
                    last_affected: None,
                });
            }
            let lower = (introduced != "0").then(|| introduced.clone());
            open = Some(lower);
        } else if let Some(fixed) = event.fixed.as_ref().or(event.limit.as_ref()) {
            ranges.push(VersionRange::Interval {
                introduced: open.take().flatten(),
                fixed: Some(fixed.clone()),
                last_affected: None,
            });
        } else if let Some(last) = &event.last_affected {
            ranges.push(VersionRange::Interval {
                introduced: open.take().flatten(),
                fixed: None,
                last_affected: Some(last.clone()),
            });
        }
    }

    if let Some(lower) = open {
        ranges.push(VersionRange::Interval {
            introduced: lower,
            fixed: None,
            last_affected: None,
        });
    }

    ranges
}

/// 심각도: `database_specific.severity` 우선, 없으면 CVSS v3 벡터에서 계산
fn severity_of(vuln: &OsvVulnerability) -> Severity {
    if let Some(severity) = vuln
        .database_specific
        .as_ref()
        .and_then(|d| d.severity.as_deref())
        .and_then(Severity::from_str_loose)
    {
        return severity;
    }

    vuln.severity
        .iter()
        .filter(|s| s.severity_type == "CVSS_V3")
        .find_map(|s| cvss_v3_base_score(&s.score))
        .map(Severity::from_cvss_score)
        .unwrap_or(Severity::None)
}

/// CVSS v3 벡터에서 기본 점수를 계산합니다.
///
/// 예: `CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H` -> 9.8
fn cvss_v3_base_score(vector: &str) -> Option<f64> {
    let metrics: HashMap<&str, &str> = vector
        .split('/')
        .skip(1)
        .filter_map(|part| part.split_once(':'))
        .collect();

    let scope_changed = match *metrics.get("S")? {
        "U" => false,
        "C" => true,
        _ => return None,
    };

    let av = match *metrics.get("AV")? {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        "P" => 0.2,
        _ => return None,
    };
    let ac = match *metrics.get("AC")? {
        "L" => 0.77,
        "H" => 0.44,
        _ => return None,
    };
    let pr = match (*metrics.get("PR")?, scope_changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        ("H", false) => 0.27,
        ("H", true) => 0.5,
        _ => return None,
    };
    let ui = match *metrics.get("UI")? {
        "N" => 0.85,
        "R" => 0.62,
        _ => return None,
    };
    let cia = |key: &str| -> Option<f64> {
        match *metrics.get(key)? {
            "N" => Some(0.0),
            "L" => Some(0.22),
            "H" => Some(0.56),
            _ => None,
        }
    };
    let (c, i, a) = (cia("C")?, cia("I")?, cia("A")?);

    let iss = 1.0 - ((1.0 - c) * (1.0 - i) * (1.0 - a));
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02_f64).powi(15)
    } else {
        6.42 * iss
    };
    let exploitability = 8.22 * av * ac * pr * ui;

    let base = if impact <= 0.0 {
        0.0
    } else if scope_changed {
        f64::min(1.08 * (impact + exploitability), 10.0)
    } else {
        f64::min(impact + exploitability, 10.0)
    };

    Some((base * 10.0).ceil() / 10.0)
}
