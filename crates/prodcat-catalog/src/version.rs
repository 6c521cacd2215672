//! Ordering of product version strings.

use std::cmp::Ordering;

/// A numeric segment holds its digits without leading zeros, so numbers of
/// any length compare by length and then lexically.
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

impl Segment<'_> {
    fn is_zero(&self) -> bool {
        matches!(self, Self::Number(digits) if digits.is_empty())
    }
}

impl Ord for Segment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Segment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let mut out = Vec::new();
    for part in version.split(['.', '-', '+', '_']) {
        if part.is_empty() {
            continue;
        }
        let digits = part.len() - part.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let (number, rest) = part.split_at(digits);
        if !number.is_empty() {
            out.push(Segment::Number(number.trim_start_matches('0')));
        }
        if !rest.is_empty() {
            out.push(Segment::Text(rest));
        }
    }
    out
}

/// Orders the remainder of a longer version against the end of a shorter
/// one. Zero segments are skipped; a text segment is a pre-release.
fn remainder<'a, 'b: 'a>(mut rest: impl Iterator<Item = &'a Segment<'b>>) -> Ordering {
    match rest.find(|s| !s.is_zero()) {
        None => Ordering::Equal,
        Some(Segment::Text(_)) => Ordering::Less,
        Some(Segment::Number(_)) => Ordering::Greater,
    }
}

/// Compares two version strings.
///
/// Numeric segments compare numerically (`1.10.0 > 1.9.0`). A text segment
/// sorts below a number or the end of the version, so pre-releases come
/// before the release they precede (`2.0.0-rc1 < 2.0.0`).
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = segments(a);
    let b = segments(b);
    let mut a_iter = a.iter();
    let mut b_iter = b.iter();
    loop {
        match (a_iter.next(), b_iter.next()) {
            (None, None) => return Ordering::Equal,
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => {}
                other => return other,
            },
            (Some(x), None) => return remainder(std::iter::once(x).chain(a_iter)),
            (None, Some(y)) => return remainder(std::iter::once(y).chain(b_iter)).reverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_compare_numerically() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("2.0.0", "10.0.0"), Ordering::Less);
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert_eq!(compare_versions("2.0.0-rc1", "2.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "2.0.0a1"), Ordering::Greater);
        assert_eq!(compare_versions("2.0.0-rc1", "2.0.0-rc2"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0-rc1", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("2", "2.0.0-rc1"), Ordering::Greater);
        assert_eq!(compare_versions("2.0.1", "2.0"), Ordering::Greater);
    }

    #[test]
    fn long_numeric_segments_are_compared() {
        assert_eq!(compare_versions("1.20240101000000000000", "1.9"), Ordering::Greater);
        assert_eq!(
            compare_versions("1.20240101000000000000", "1.20240101000000000001"),
            Ordering::Less
        );
        assert_eq!(compare_versions("1.007", "1.7"), Ordering::Equal);
    }

    #[test]
    fn trailing_zeros_are_equal() {
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.2.0", "1.2"), Ordering::Equal);
    }

    #[test]
    fn sorting_picks_latest() {
        let mut versions = vec!["1.0.0", "2.0.0-beta", "1.10.1", "2.0.0", "1.2.3"];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(versions.last(), Some(&"2.0.0"));
        assert_eq!(versions, ["1.0.0", "1.2.3", "1.10.1", "2.0.0-beta", "2.0.0"]);
    }
}
