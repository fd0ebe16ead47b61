//! SemVer 비교 (npm, cargo, go, nuget, hex, pub, packagist)
//!
//! `semver` 크레이트로 파싱하되, 패키지 레지스트리에서 흔한 변형을 허용합니다.
//!
//! - `v` 접두사 (`v1.9.0`, Go 모듈)
//! - 생략된 minor/patch (`1`, `1.2`)
//! - build metadata는 비교에서 무시 (`1.0.0+incompatible == 1.0.0`)

use std::cmp::Ordering;

use semver::{BuildMetadata, Version};

/// 관대한 SemVer 파싱
pub fn parse_lenient(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix(['v', 'V', '='])
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let parts = core.split('.').count();
    if !core.split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let padded = match parts {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        3 => trimmed.to_owned(),
        _ => return None,
    };

    let mut version = Version::parse(&padded).ok()?;
    version.build = BuildMetadata::EMPTY;
    Some(version)
}

/// 두 버전 문자열을 비교합니다. 어느 한쪽이라도 파싱에 실패하면 `None`
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_lenient(a)?.cmp(&parse_lenient(b)?))
}
