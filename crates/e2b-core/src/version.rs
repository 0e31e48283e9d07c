use std::cmp::Ordering;

use semver::Version;

/// envd started defaulting the Basic-auth user in this release.
pub const ENVD_VERSION_DEFAULT_USER: &str = "0.4.0";

/// Disabling stdin on a command requires at least this envd release.
pub const ENVD_VERSION_STDIN_DISABLE: &str = "0.3.0";

/// Recursive directory watch requires at least this envd release.
pub const ENVD_VERSION_RECURSIVE_WATCH: &str = "0.1.4";

/// Compares two semantic version strings, accepting an optional `v` prefix.
///
/// An empty left-hand version compares less than everything; a version that
/// does not parse is treated as older than one that does.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a.is_empty() {
        return Ordering::Less;
    }
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, _) => Ordering::Less,
    }
}

fn parse(version: &str) -> Option<Version> {
    Version::parse(version.trim_start_matches('v')).ok()
}
