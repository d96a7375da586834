use std::cmp::Ordering;

use semver::Version;

/// Parse a subject version, tolerating a leading `v`.
pub fn parse_subject_version(s: &str) -> Option<Version> {
    let s = s.trim();
    Version::parse(s.strip_prefix('v').unwrap_or(s)).ok()
}

/// Semantic-version order; unparsable versions sort lexically after all
/// parsable ones.
pub fn compare_subject_versions(a: &str, b: &str) -> Ordering {
    match (parse_subject_version(a), parse_subject_version(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
