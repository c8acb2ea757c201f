//! Four-part version numbers (`major.minor.build.revision`).
//!
//! Used for build-driver file versions, MSVC toolset directory names and
//! Windows SDK directory names. Missing trailing parts read as `0`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub [u32; 4]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,
    #[error("version '{0}' has more than four parts")]
    TooManyParts(String),
    #[error("version '{input}' has a non-numeric part '{part}'")]
    NotNumeric { input: String, part: String },
}

impl Version {
    pub const ZERO: Version = Version([0, 0, 0, 0]);

    pub fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self([major, minor, build, revision])
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let mut out = [0u32; 4];
        for (i, part) in s.split('.').enumerate() {
            if i >= 4 {
                return Err(VersionParseError::TooManyParts(s.to_string()));
            }
            out[i] = part.parse().map_err(|_| VersionParseError::NotNumeric {
                input: s.to_string(),
                part: part.to_string(),
            })?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

/// Compare two optional versions. An absent version sorts below every
/// present one; two absent versions are equal.
pub fn compare_versions(a: Option<&Version>, b: Option<&Version>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Pick the candidate with the strictly highest version. Ties keep the
/// earlier candidate; candidates without a version never win over one
/// that has a version.
pub fn newest<T>(candidates: impl IntoIterator<Item = (T, Option<Version>)>) -> Option<(T, Version)> {
    let mut best: Option<(T, Option<Version>)> = None;
    for (item, version) in candidates {
        let replace = match &best {
            None => true,
            Some((_, best_version)) => {
                compare_versions(version.as_ref(), best_version.as_ref()) == Ordering::Greater
            }
        };
        if replace {
            best = Some((item, version));
        }
    }
    best.map(|(item, version)| (item, version.unwrap_or(Version::ZERO)))
}
