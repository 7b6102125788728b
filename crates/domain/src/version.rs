//! Release tag ordering.
//!
//! Tags are semver strings, optionally prefixed with `v`. Listings are
//! ordered newest-first by semver precedence (so `2.0.0 > 1.10.0 > 1.9.0 >
//! 1.9.0-rc.1`). Tags that predate the semver requirement and no longer
//! parse sort after every parseable tag, lexicographically.

use std::cmp::Ordering;

use semver::Version;

/// Parse a release tag into a semver [`Version`]. A single leading `v` is
/// accepted and stripped.
pub fn parse_tag(tag: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Compare two tags for a newest-first listing.
pub fn cmp_tags_desc(a: &str, b: &str) -> Ordering {
    match (parse_tag(a), parse_tag(b)) {
        (Some(va), Some(vb)) => vb.cmp(&va),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
