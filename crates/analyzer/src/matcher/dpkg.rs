//! Debian 패키지 버전 비교 (debian, ubuntu)
//!
//! `[epoch:]upstream[-revision]` 형식을 dpkg의 `verrevcmp` 규칙으로 비교합니다.
//! `~`는 빈 문자열보다도 앞서므로 `1.0~rc1 < 1.0`입니다.

use std::cmp::Ordering;

/// 파싱된 Debian 버전
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebianVersion<'a> {
    epoch: u64,
    upstream: &'a str,
    revision: &'a str,
}

/// Debian 버전을 파싱합니다. 형식이 맞지 않으면 `None`
pub fn parse(input: &str) -> Option<DebianVersion<'_>> {
    let input = input.trim();

    let (epoch, rest) = match input.split_once(':') {
        Some((e, rest)) => (e.parse::<u64>().ok()?, rest),
        None => (0, input),
    };

    let (upstream, revision) = match rest.rsplit_once('-') {
        Some((upstream, revision)) => (upstream, revision),
        None => (rest, ""),
    };

    if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '~' | '-' | ':');
    if !upstream.chars().all(allowed) || !revision.chars().all(allowed) {
        return None;
    }

    Some(DebianVersion {
        epoch,
        upstream,
        revision,
    })
}

impl Ord for DebianVersion<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(self.upstream, other.upstream))
            .then_with(|| verrevcmp(self.revision, other.revision))
    }
}

impl PartialOrd for DebianVersion<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 두 버전 문자열을 비교합니다. 어느 한쪽이라도 파싱에 실패하면 `None`
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse(a)?.cmp(&parse(b)?))
}

/// 비숫자 문자의 정렬 가중치. 문자열 끝은 0
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(b'~') => -1,
        Some(c) => i32::from(c) + 256,
    }
}

fn verrevcmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}
