//! 컴포넌트 키 정규화
//!
//! SBOM 추출기가 내보낸 [`RawComponent`]를 분석 단위인 [`ComponentKey`]로 변환합니다.
//! 두 컴포넌트는 키가 같을 때 분석상 동일하며, 한 번만 질의됩니다.
//!
//! # 정규화 규칙
//!
//! - 이름: 앞뒤 공백 제거 + 소문자화. 비어있으면 거부. 원래 표기는 질의용으로 따로 보관
//! - 버전: 그대로 유지. 비어있거나 공백뿐이면 거부
//! - 에코시스템: 공백 제거 + 소문자화 후 별칭 테이블로 정규화
//!   (`node` -> `npm`, `golang` -> `go`, ...). 없으면 purl 타입에서 유도하고,
//!   그래도 없으면 [`GENERIC_ECOSYSTEM`]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

/// 에코시스템을 알 수 없는 컴포넌트에 부여되는 값
pub const GENERIC_ECOSYSTEM: &str = "generic";

/// SBOM 추출기가 내보내는 원본 컴포넌트 레코드
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawComponent {
    /// 패키지 이름
    pub name: String,
    /// 패키지 버전 (원문)
    pub version: String,
    /// 에코시스템 (있을 경우)
    #[serde(default)]
    pub ecosystem: Option<String>,
    /// Package URL (있을 경우)
    #[serde(default)]
    pub purl: Option<String>,
    /// SBOM 엔트리 식별자 (CycloneDX `bom-ref` 등)
    #[serde(default, alias = "bom-ref")]
    pub bom_ref: Option<String>,
}

impl RawComponent {
    /// 이름, 버전, 에코시스템으로 컴포넌트를 생성합니다.
    pub fn new(
        ecosystem: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem: Some(ecosystem.into()),
            purl: None,
            bom_ref: None,
        }
    }

    /// SBOM 엔트리 식별자를 지정합니다.
    pub fn with_bom_ref(mut self, bom_ref: impl Into<String>) -> Self {
        self.bom_ref = Some(bom_ref.into());
        self
    }

    /// Package URL을 지정합니다.
    pub fn with_purl(mut self, purl: impl Into<String>) -> Self {
        self.purl = Some(purl.into());
        self
    }
}

/// 정규화된 컴포넌트 키
///
/// `(ecosystem, name, version)` 순서로 전순서를 가지며, 분석 결과의 정렬 기준입니다.
///
/// 동등성, 정렬, 해시는 세 필드만 사용합니다. 원래 표기의 패키지 이름은
/// 취약점 소스 질의에만 쓰이며 직렬화되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentKey {
    /// 정규화된 에코시스템
    pub ecosystem: String,
    /// 정규화된 이름
    pub name: String,
    /// 원문 버전
    pub version: String,
    #[serde(skip)]
    package_name: Option<String>,
}

impl ComponentKey {
    /// 이미 정규화된 값으로 키를 생성합니다.
    pub fn new(
        ecosystem: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem: ecosystem.into(),
            name: name.into(),
            version: version.into(),
            package_name: None,
        }
    }

    /// 질의에 사용할 원래 표기의 패키지 이름을 지정합니다.
    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    /// 취약점 소스에 보낼 패키지 이름
    ///
    /// Go, NuGet 등은 이름을 대소문자 구분으로 매칭하므로 SBOM의 원래 표기를 사용합니다.
    /// 원래 표기가 없으면 (예: 저장소에서 복원된 키) 정규화된 이름입니다.
    pub fn package_name(&self) -> &str {
        self.package_name.as_deref().unwrap_or(&self.name)
    }

    fn identity(&self) -> (&str, &str, &str) {
        (&self.ecosystem, &self.name, &self.version)
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ComponentKey {}

impl PartialOrd for ComponentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.ecosystem, self.name, self.version)
    }
}

/// 원본 컴포넌트를 정규화된 키로 변환합니다.
///
/// 결정적이며 부작용이 없습니다.
///
/// # Errors
///
/// 이름이나 버전이 비어있으면 `AnalyzerError::InvalidComponent` (index 0)
pub fn normalize(raw: &RawComponent) -> Result<ComponentKey, AnalyzerError> {
    normalize_at(0, raw)
}

fn normalize_at(index: usize, raw: &RawComponent) -> Result<ComponentKey, AnalyzerError> {
    let name = raw.name.trim();
    if name.is_empty() {
        return Err(AnalyzerError::InvalidComponent {
            index,
            reason: "component name is empty".to_owned(),
        });
    }

    if raw.version.trim().is_empty() {
        return Err(AnalyzerError::InvalidComponent {
            index,
            reason: format!("component '{name}' has an empty version"),
        });
    }

    let ecosystem = raw
        .ecosystem
        .as_deref()
        .map(canonical_ecosystem)
        .filter(|eco| eco != GENERIC_ECOSYSTEM)
        .or_else(|| raw.purl.as_deref().and_then(purl_type).map(canonical_ecosystem))
        .unwrap_or_else(|| GENERIC_ECOSYSTEM.to_owned());

    Ok(
        ComponentKey::new(ecosystem, name.to_lowercase(), raw.version.clone())
            .with_package_name(name),
    )
}

/// 에코시스템 문자열을 정규 이름으로 변환합니다.
///
/// 알려지지 않은 값은 소문자화만 하여 유지합니다. 빈 값과 `unknown`은 `generic`입니다.
pub fn canonical_ecosystem(raw: &str) -> String {
    let folded = raw.trim().to_lowercase();
    let canonical = match folded.as_str() {
        "npm" | "node" | "nodejs" | "js" | "javascript" => "npm",
        "cargo" | "crates.io" | "crates" | "crate" | "rust" => "cargo",
        "go" | "golang" => "go",
        "pypi" | "pip" | "python" => "pypi",
        "maven" | "java" => "maven",
        "nuget" | ".net" | "dotnet" => "nuget",
        "rubygems" | "gem" | "gems" | "ruby" => "rubygems",
        "packagist" | "composer" | "php" => "packagist",
        "hex" | "erlang" | "elixir" => "hex",
        "pub" | "dart" => "pub",
        "debian" | "deb" => "debian",
        "ubuntu" => "ubuntu",
        "" | "unknown" | "generic" | "none" => GENERIC_ECOSYSTEM,
        _ => return folded,
    };
    canonical.to_owned()
}

/// purl에서 타입 부분(`pkg:<type>/...`)을 추출합니다.
fn purl_type(purl: &str) -> Option<&str> {
    let rest = purl.trim().strip_prefix("pkg:")?;
    let ty = rest.split('/').next()?;
    if ty.is_empty() { None } else { Some(ty) }
}

/// 같은 키로 묶인 SBOM 엔트리 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// 같은 키를 가진 엔트리 수
    pub count: usize,
    /// 엔트리 식별자 (bom_ref가 없으면 `#<index>`)
    pub entry_refs: Vec<String>,
}

/// 중복 제거된 분석 계획
///
/// 입력 컴포넌트를 키별로 묶습니다. `BTreeMap`이므로 순회 순서가 결정적입니다.
#[derive(Debug, Clone, Default)]
pub struct ComponentPlan {
    components: BTreeMap<ComponentKey, Occurrence>,
    total_entries: usize,
}

impl ComponentPlan {
    /// 컴포넌트 목록을 정규화하고 중복을 제거합니다.
    ///
    /// 하나라도 유효하지 않으면 전체가 실패하며, 어떤 질의도 일어나지 않습니다.
    ///
    /// # Errors
    ///
    /// - `AnalyzerError::TooManyComponents`: 입력이 `max_components` 초과
    /// - `AnalyzerError::InvalidComponent`: 첫 번째로 발견된 잘못된 컴포넌트
    pub fn build(components: &[RawComponent], max_components: usize) -> Result<Self, AnalyzerError> {
        if components.len() > max_components {
            return Err(AnalyzerError::TooManyComponents {
                count: components.len(),
                max: max_components,
            });
        }

        let mut plan = BTreeMap::<ComponentKey, Occurrence>::new();
        for (index, raw) in components.iter().enumerate() {
            let key = normalize_at(index, raw)?;
            let entry_ref = raw
                .bom_ref
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| format!("#{index}"));
            // 같은 키가 이미 있으면 먼저 등장한 키(와 그 원래 표기)가 유지됩니다.
            let occurrence = plan.entry(key).or_default();
            occurrence.count += 1;
            occurrence.entry_refs.push(entry_ref);
        }

        Ok(Self {
            components: plan,
            total_entries: components.len(),
        })
    }

    /// 고유 키 수
    pub fn unique_count(&self) -> usize {
        self.components.len()
    }

    /// 입력 엔트리 수 (중복 포함)
    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    /// 고유 키를 정렬 순서대로 반환합니다.
    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.components.keys()
    }

    /// 키의 엔트리 정보
    pub fn occurrence(&self, key: &ComponentKey) -> Option<&Occurrence> {
        self.components.get(key)
    }

    /// 키와 엔트리 정보를 소유권과 함께 반환합니다.
    pub fn into_entries(self) -> impl Iterator<Item = (ComponentKey, Occurrence)> {
        self.components.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_name_and_ecosystem() {
        let raw = RawComponent::new(" NPM ", "  Lodash ", "4.17.20");
        let key = normalize(&raw).unwrap();
        assert_eq!(key.ecosystem, "npm");
        assert_eq!(key.name, "lodash");
        assert_eq!(key.version, "4.17.20");
    }

    #[test]
    fn normalize_keeps_version_verbatim() {
        let raw = RawComponent::new("pypi", "Django", " 4.2.0rc1");
        let key = normalize(&raw).unwrap();
        assert_eq!(key.version, " 4.2.0rc1");
    }

    #[test]
    fn normalize_rejects_empty_name() {
        let raw = RawComponent::new("npm", "   ", "1.0.0");
        let err = normalize(&raw).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidComponent { index: 0, .. }));
    }

    #[test]
    fn normalize_rejects_whitespace_version() {
        let raw = RawComponent::new("npm", "left-pad", " \t ");
        let err = normalize(&raw).unwrap_err();
        assert!(err.to_string().contains("left-pad"));
    }

    #[test]
    fn ecosystem_aliases_collapse() {
        assert_eq!(canonical_ecosystem("golang"), "go");
        assert_eq!(canonical_ecosystem("crates.io"), "cargo");
        assert_eq!(canonical_ecosystem("PyPI"), "pypi");
        assert_eq!(canonical_ecosystem("composer"), "packagist");
        assert_eq!(canonical_ecosystem("deb"), "debian");
    }

    #[test]
    fn unknown_ecosystem_is_kept_folded() {
        assert_eq!(canonical_ecosystem("Conan"), "conan");
    }

    #[test]
    fn missing_ecosystem_becomes_generic() {
        let raw = RawComponent {
            name: "zlib".to_owned(),
            version: "1.2.13".to_owned(),
            ..Default::default()
        };
        assert_eq!(normalize(&raw).unwrap().ecosystem, GENERIC_ECOSYSTEM);

        let raw = RawComponent::new("", "zlib", "1.2.13");
        assert_eq!(normalize(&raw).unwrap().ecosystem, GENERIC_ECOSYSTEM);
    }

    #[test]
    fn missing_ecosystem_derived_from_purl() {
        let raw = RawComponent {
            name: "github.com/gin-gonic/gin".to_owned(),
            version: "v1.9.0".to_owned(),
            ecosystem: None,
            purl: Some("pkg:golang/github.com/gin-gonic/gin@v1.9.0".to_owned()),
            bom_ref: None,
        };
        assert_eq!(normalize(&raw).unwrap().ecosystem, "go");
    }

    #[test]
    fn generic_ecosystem_falls_through_to_purl() {
        let raw = RawComponent::new("unknown", "express", "4.18.2").with_purl("pkg:npm/express@4.18.2");
        assert_eq!(normalize(&raw).unwrap().ecosystem, "npm");
    }

    #[test]
    fn purl_type_rejects_non_purl() {
        assert_eq!(purl_type("npm/lodash@1.0.0"), None);
        assert_eq!(purl_type("pkg:/lodash"), None);
        assert_eq!(purl_type("pkg:cargo/serde@1.0.0"), Some("cargo"));
    }

    #[test]
    fn keys_order_by_ecosystem_then_name_then_version() {
        let a = ComponentKey::new("cargo", "zzz", "1");
        let b = ComponentKey::new("npm", "aaa", "1");
        assert!(a < b);
    }

    #[test]
    fn normalize_keeps_original_case_for_queries() {
        let raw = RawComponent::new("go", " github.com/BurntSushi/toml ", "v1.2.0");
        let key = normalize(&raw).unwrap();
        assert_eq!(key.name, "github.com/burntsushi/toml");
        assert_eq!(key.package_name(), "github.com/BurntSushi/toml");
        assert_eq!(key, ComponentKey::new("go", "github.com/burntsushi/toml", "v1.2.0"));
    }

    #[test]
    fn package_name_is_not_serialized() {
        let key = ComponentKey::new("nuget", "newtonsoft.json", "12.0.1")
            .with_package_name("Newtonsoft.Json");
        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("package_name").is_none());

        let restored: ComponentKey = serde_json::from_value(json).unwrap();
        assert_eq!(restored, key);
        assert_eq!(restored.package_name(), "newtonsoft.json");
    }

    #[test]
    fn plan_keeps_first_seen_package_name() {
        let components = vec![
            RawComponent::new("nuget", "Newtonsoft.Json", "12.0.1"),
            RawComponent::new("nuget", "NEWTONSOFT.JSON", "12.0.1"),
        ];
        let plan = ComponentPlan::build(&components, 10).unwrap();
        let (key, occurrence) = plan.into_entries().next().unwrap();
        assert_eq!(occurrence.count, 2);
        assert_eq!(key.package_name(), "Newtonsoft.Json");
    }

    #[test]
    fn plan_deduplicates_and_records_refs() {
        let components = vec![
            RawComponent::new("npm", "lodash", "4.17.20").with_bom_ref("app/lodash"),
            RawComponent::new("npm", "express", "4.18.2"),
            RawComponent::new("node", "LODASH", "4.17.20").with_bom_ref("lib/lodash"),
        ];
        let plan = ComponentPlan::build(&components, 100).unwrap();
        assert_eq!(plan.unique_count(), 2);
        assert_eq!(plan.total_entries(), 3);

        let key = normalize(&components[0]).unwrap();
        let occ = plan.occurrence(&key).unwrap();
        assert_eq!(occ.count, 2);
        assert_eq!(occ.entry_refs, vec!["app/lodash", "lib/lodash"]);

        let express = normalize(&components[1]).unwrap();
        assert_eq!(plan.occurrence(&express).unwrap().entry_refs, vec!["#1"]);
    }

    #[test]
    fn plan_reports_index_of_first_invalid_component() {
        let components = vec![
            RawComponent::new("npm", "lodash", "4.17.20"),
            RawComponent::new("npm", "", "1.0.0"),
            RawComponent::new("npm", "x", ""),
        ];
        let err = ComponentPlan::build(&components, 100).unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidComponent { index: 1, .. }));
    }

    #[test]
    fn plan_rejects_too_many_components() {
        let components = vec![RawComponent::new("npm", "a", "1.0.0"); 3];
        let err = ComponentPlan::build(&components, 2).unwrap_err();
        assert_eq!(err, AnalyzerError::TooManyComponents { count: 3, max: 2 });
    }

    #[test]
    fn raw_component_deserializes_bom_ref_alias() {
        let raw: RawComponent = serde_json::from_str(
            r#"{"name":"serde","version":"1.0.0","ecosystem":"cargo","bom-ref":"pkg-1"}"#,
        )
        .unwrap();
        assert_eq!(raw.bom_ref.as_deref(), Some("pkg-1"));
    }
}
