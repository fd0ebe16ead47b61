//! PEP 440 버전 비교 (pypi)
//!
//! 파싱과 정렬은 `pep440_rs`에 맡기고, local 버전 레이블(`+ubuntu.1`)은
//! 취약점 범위 비교에서 무시합니다.
//!
//! 정렬 순서: `1.0.dev0 < 1.0a1.dev0 < 1.0a1 < 1.0a1.post1 < 1.0rc1 < 1.0 < 1.0.post1`

use std::cmp::Ordering;
use std::str::FromStr;

use pep440_rs::Version;

/// PEP 440 버전을 파싱합니다. local 레이블은 떼어냅니다.
pub fn parse(input: &str) -> Option<Version> {
    let public = match input.trim().split_once('+') {
        Some((_, "")) => return None,
        Some((public, _)) => public,
        None => input.trim(),
    };
    Version::from_str(public).ok()
}

/// 두 버전을 비교합니다. 어느 한쪽이라도 PEP 440 형식이 아니면 `None`.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse(a)?.cmp(&parse(b)?))
}
