//! Lenient dotted-version parsing and comparison.
//!
//! Remote version strings come from plain-text endpoints that nobody
//! validates, so parsing never fails: anything unparsable is the zero
//! version, and the zero version is never newer than a real build. A broken
//! remote file therefore reads as "up to date" instead of blocking startup or
//! looping on reinstalls.

use std::cmp::Ordering;
use std::fmt;

/// A `(major, minor, patch)` triple ordered lexicographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl Version {
    /// The version every malformed string degrades to.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Build a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a dotted version string.
    ///
    /// Surrounding whitespace and `v`/`V` prefixes are ignored. Missing
    /// components default to 0 and components beyond the third are ignored.
    /// Any component that is not a plain non-negative integer makes the whole
    /// string parse as [`Version::ZERO`].
    ///
    /// ```
    /// use monolith_updater::upgrade::version::Version;
    ///
    /// assert_eq!(Version::parse("v1.2"), Version::new(1, 2, 0));
    /// assert_eq!(Version::parse("1.0.5-beta"), Version::ZERO);
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim().trim_start_matches(['v', 'V']);
        if trimmed.is_empty() {
            return Self::ZERO;
        }

        let mut parts = [0u64; 3];
        for (slot, component) in parts.iter_mut().zip(trimmed.split('.')) {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Self::ZERO;
            }
            match component.parse() {
                Ok(value) => *slot = value,
                Err(_) => return Self::ZERO,
            }
        }

        Self::new(parts[0], parts[1], parts[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compare two version strings after lenient parsing.
#[must_use]
pub fn compare(local: &str, remote: &str) -> Ordering {
    Version::parse(local).cmp(&Version::parse(remote))
}

/// Whether `remote` is strictly newer than `local`.
///
/// Equal versions, older versions and unparsable remotes all answer `false`.
#[must_use]
pub fn is_update_available(local: &str, remote: &str) -> bool {
    compare(local, remote) == Ordering::Less
}
