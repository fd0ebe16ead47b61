//! 정적 취약점 DB -- 로컬 JSON 파일 기반 소스
//!
//! [`StaticSource`]는 로컬 JSON 파일에서 취약점 데이터를 로드하여 메모리에서 조회합니다.
//! 네트워크 없이 동작하므로 오프라인 분석과 결정적 테스트에 사용합니다.
//!
//! # DB 디렉토리 구조
//!
//! ```text
//! /var/lib/defectdetect/vuln-db/
//!   npm.json
//!   pypi.json
//!   anything.json   # 디렉토리의 모든 *.json 파일을 이름 순으로 로드
//! ```
//!
//! # JSON 형식
//!
//! ```json
//! [
//!   {
//!     "id": "GHSA-35jh-r3h4-6jhm",
//!     "package": "lodash",
//!     "ecosystem": "npm",
//!     "summary": "Command injection in lodash",
//!     "severity": "HIGH",
//!     "affected_ranges": [
//!       { "type": "interval", "introduced": "4.0.0", "fixed": "4.17.21" }
//!     ],
//!     "aliases": ["CVE-2021-23337"]
//!   }
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use defectdetect_core::types::Severity;

use super::{VersionRange, VulnerabilityRecord, VulnerabilitySource};
use crate::component::{ComponentKey, canonical_ecosystem};
use crate::error::{AnalyzerError, SourceError};

/// DB 파일 최대 크기 (50 MB)
const MAX_DB_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 전체 엔트리 최대 개수 (1,000,000개)
const MAX_DB_ENTRIES: usize = 1_000_000;

/// 정적 DB 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticEntry {
    /// 취약점 ID
    pub id: String,
    /// 영향받는 패키지명
    pub package: String,
    /// 패키지 에코시스템 (별칭 허용, 로드 시 정규화)
    pub ecosystem: String,
    /// 요약
    #[serde(default)]
    pub summary: String,
    /// 심각도
    #[serde(default)]
    pub severity: Severity,
    /// 영향받는 버전 범위
    #[serde(default)]
    pub affected_ranges: Vec<VersionRange>,
    /// 별칭 ID
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl StaticEntry {
    fn to_record(&self) -> VulnerabilityRecord {
        VulnerabilityRecord {
            id: self.id.clone(),
            summary: self.summary.clone(),
            severity: self.severity,
            affected_ranges: self.affected_ranges.clone(),
            aliases: self.aliases.clone(),
        }
    }
}

/// 정적 취약점 소스
///
/// `(ecosystem, package)` 쌍으로 인덱싱된 HashMap으로 O(1) 조회합니다.
/// 키는 컴포넌트 정규화와 같은 규칙(소문자화, 에코시스템 별칭)으로 만들어집니다.
#[derive(Debug, Default)]
pub struct StaticSource {
    entries: Vec<StaticEntry>,
    index: HashMap<(String, String), Vec<usize>>,
}

impl StaticSource {
    /// 빈 소스를 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    fn index_key(ecosystem: &str, package: &str) -> (String, String) {
        (canonical_ecosystem(ecosystem), package.trim().to_lowercase())
    }

    fn build_index(entries: &[StaticEntry]) -> HashMap<(String, String), Vec<usize>> {
        let mut index: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            index
                .entry(Self::index_key(&entry.ecosystem, &entry.package))
                .or_default()
                .push(idx);
        }
        index
    }

    /// 엔트리 목록으로 소스를 생성합니다.
    pub fn from_entries(entries: Vec<StaticEntry>) -> Self {
        let index = Self::build_index(&entries);
        Self { entries, index }
    }

    /// JSON 문자열에서 소스를 파싱합니다.
    ///
    /// JSON 형식: `StaticEntry` 배열
    pub fn from_json(json: &str) -> Result<Self, AnalyzerError> {
        let entries: Vec<StaticEntry> = serde_json::from_str(json).map_err(|e| {
            AnalyzerError::VulnDbParse(format!("failed to parse vulnerability db JSON: {e}"))
        })?;
        Ok(Self::from_entries(entries))
    }

    /// 디렉토리의 모든 `*.json` 파일을 로드합니다.
    ///
    /// # 보안 제한
    ///
    /// - 파일당 최대 50MB
    /// - 전체 엔트리 최대 1,000,000개 (초과분은 경고 후 버림)
    ///
    /// # Note
    ///
    /// 동기 I/O를 수행합니다. async 컨텍스트에서는
    /// `tokio::task::spawn_blocking`으로 감싸세요.
    pub fn load_from_dir(dir_path: &Path) -> Result<Self, AnalyzerError> {
        let read_dir = std::fs::read_dir(dir_path).map_err(|e| AnalyzerError::VulnDbLoad {
            path: dir_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut files: Vec<_> = read_dir
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut all_entries = Vec::new();

        for file_path in files {
            let metadata = std::fs::metadata(&file_path).map_err(|e| AnalyzerError::VulnDbLoad {
                path: file_path.display().to_string(),
                reason: e.to_string(),
            })?;

            if metadata.len() > MAX_DB_FILE_SIZE {
                return Err(AnalyzerError::VulnDbLoad {
                    path: file_path.display().to_string(),
                    reason: format!(
                        "file size {} bytes exceeds maximum {} bytes",
                        metadata.len(),
                        MAX_DB_FILE_SIZE
                    ),
                });
            }

            let content =
                std::fs::read_to_string(&file_path).map_err(|e| AnalyzerError::VulnDbLoad {
                    path: file_path.display().to_string(),
                    reason: e.to_string(),
                })?;

            let entries: Vec<StaticEntry> = serde_json::from_str(&content).map_err(|e| {
                AnalyzerError::VulnDbParse(format!("failed to parse {}: {e}", file_path.display()))
            })?;

            if all_entries.len() + entries.len() > MAX_DB_ENTRIES {
                tracing::warn!(
                    current = all_entries.len(),
                    new = entries.len(),
                    max = MAX_DB_ENTRIES,
                    "vulnerability database entry limit reached, truncating"
                );
                let remaining = MAX_DB_ENTRIES.saturating_sub(all_entries.len());
                all_entries.extend(entries.into_iter().take(remaining));
                break;
            }

            tracing::info!(
                path = %file_path.display(),
                entries = entries.len(),
                "loaded vulnerability db file"
            );
            all_entries.extend(entries);
        }

        Ok(Self::from_entries(all_entries))
    }

    /// 전체 엔트리 수
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// 패키지와 에코시스템으로 엔트리를 조회합니다.
    pub fn lookup(&self, ecosystem: &str, package: &str) -> Vec<&StaticEntry> {
        self.index
            .get(&Self::index_key(ecosystem, package))
            .map(|indices| indices.iter().filter_map(|&i| self.entries.get(i)).collect())
            .unwrap_or_default()
    }
}

impl VulnerabilitySource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self, key: &ComponentKey) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        Ok(self
            .lookup(&key.ecosystem, &key.name)
            .into_iter()
            .map(StaticEntry::to_record)
            .collect())
    }
}
