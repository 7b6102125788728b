//! Identifier validation for owners, repos, tags and alias short names.
//!
//! Owners, repos and alias short names share one charset: ASCII letters,
//! digits, `-` and `_`, 1–64 chars. Tags additionally allow `.` and `+`
//! (semver separators) but never path metacharacters.

/// Maximum length of any single identifier segment.
pub const MAX_IDENT_LEN: usize = 64;

/// Validate an owner, repo or alias short name.
pub fn is_valid_ident(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_IDENT_LEN
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validate a release tag as a path segment.
///
/// This is the loose check applied on lookup paths; publish additionally
/// requires the tag to parse as semver (see [`crate::version::parse_tag`]).
pub fn is_valid_tag(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_IDENT_LEN
        && !s.contains("..")
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'+')
        })
}
