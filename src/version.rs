// Version normalisation for loosely formatted editor version strings

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

lazy_static! {
    static ref LEADING_VERSION: Regex =
        Regex::new(r"^v?(\d+(?:\.\d+)*)").expect("leading version pattern");
    static ref DESCRIBE_SUFFIX: Regex =
        Regex::new(r"-\d+-g([0-9a-fA-F]{7,})$").expect("describe suffix pattern");
}

/// Dot-separated numeric version. Trailing zero groups are dropped on
/// construction, so "0.5.0" and "0.5" are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Semver {
    parts: Vec<u64>,
}

impl Semver {
    /// Parse the leading `v?N(.N)*` run of a string.
    ///
    /// Leading zeros inside a group collapse ("8.2.0012" -> "8.2.12").
    pub fn parse(text: &str) -> Option<Self> {
        let captures = LEADING_VERSION.captures(text)?;
        let parts = captures[1]
            .split('.')
            .map(|group| group.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self::from_parts(parts))
    }

    pub fn from_parts(mut parts: Vec<u64>) -> Self {
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        if parts.is_empty() {
            parts.push(0);
        }
        Self { parts }
    }
}

impl Ord for Semver {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| {
                let a = self.parts.get(i).copied().unwrap_or(0);
                let b = other.parts.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always print at least "major.minor" so the text reparses as a version
        let mut parts: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        if parts.len() == 1 {
            parts.push("0".to_string());
        }
        write!(f, "{}", parts.join("."))
    }
}

/// Result of [`normalize`]: the semantic part and a secondary identifier
/// (commit fragment or symbolic suffix such as "nightly").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedVersion {
    pub semver: Option<Semver>,
    pub secondary: Option<String>,
}

impl NormalizedVersion {
    /// At least one half is needed to resolve anything.
    pub fn is_resolvable(&self) -> bool {
        self.semver.is_some() || self.secondary.is_some()
    }
}

/// Split a version string into its semantic and secondary parts
///
/// Examples:
/// - "v8.2.0012" -> ("8.2.12", None)
/// - "v0.5.0-404-g49cd750d6" -> ("0.5", "49cd750d6")
/// - "v0.5.0-dev+nightly" -> ("0.5", "nightly")
/// - a bare commit hash (no dot) -> (None, hash)
pub fn normalize(spec: &str) -> NormalizedVersion {
    if !spec.contains('.') {
        return NormalizedVersion {
            semver: None,
            secondary: Some(spec.to_string()),
        };
    }

    let cleaned = spec.replace("dev+", "");
    let semver = Semver::parse(&cleaned);

    let secondary = if let Some(captures) = DESCRIBE_SUFFIX.captures(&cleaned) {
        Some(captures[1].to_string())
    } else if cleaned.contains('-') {
        cleaned
            .rsplit('-')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    } else {
        None
    };

    NormalizedVersion { semver, secondary }
}

/// A concrete, installable version produced by resolution: a release tag,
/// a describe-style tag, or a raw commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedVersion(String);

impl FixedVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FixedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic part only; `None` for tags like "nightly" or commit hashes.
///
/// A specifier needs a dot to count as a version, so "v8" or "1" are exact
/// tag names here. Floors never reject them and they only resolve to a
/// release or git ref of exactly that name.
pub fn to_semver(version: &str) -> Option<Semver> {
    normalize(version).semver
}

pub fn compare(a: &Semver, b: &Semver) -> Ordering {
    a.cmp(b)
}
