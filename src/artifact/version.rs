//! Semantic versions attached to every artifact revision

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which component of the version an update increments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionBump {
    /// Breaking rewrite; resets minor and patch
    Major,
    /// Additive change; resets patch
    Minor,
    /// Small correction
    #[default]
    Patch,
}

impl FromStr for VersionBump {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(format!("unknown version bump '{}'", other)),
        }
    }
}

/// Version record of a single artifact revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// sha256 over title, content and knowledge type
    #[serde(default)]
    pub checksum: String,
    /// Human-readable description of the change
    #[serde(default)]
    pub changelog: String,
    /// Version string this revision was derived from
    #[serde(default)]
    pub parent_version: Option<String>,
    /// When this revision was created
    pub created_at: DateTime<Utc>,
    /// Contributor responsible for this revision
    #[serde(default)]
    pub created_by: String,
}

impl Version {
    /// First version of a newly created artifact (1.0.0)
    pub fn initial() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
            checksum: String::new(),
            changelog: "Initial version".to_string(),
            parent_version: None,
            created_at: Utc::now(),
            created_by: String::new(),
        }
    }

    /// `(major, minor, patch)` for ordering comparisons
    pub fn as_tuple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// Compute the successor version. The checksum is left empty for the
    /// caller to fill in once the new content is final.
    pub fn next(&self, bump: VersionBump, changelog: impl Into<String>, created_by: impl Into<String>) -> Self {
        let (major, minor, patch) = match bump {
            VersionBump::Major => (self.major + 1, 0, 0),
            VersionBump::Minor => (self.major, self.minor + 1, 0),
            VersionBump::Patch => (self.major, self.minor, self.patch + 1),
        };
        Self {
            major,
            minor,
            patch,
            checksum: String::new(),
            changelog: changelog.into(),
            parent_version: Some(self.to_string()),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    /// Parse a `major.minor.patch` string into its numeric triple
    pub fn parse_triple(s: &str) -> Option<(u32, u32, u32)> {
        let mut parts = s.trim().trim_start_matches('v').split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((major, minor, patch))
    }

    /// Whether this version matches a `major.minor.patch` string
    pub fn matches(&self, version: &str) -> bool {
        Self::parse_triple(version) == Some(self.as_tuple())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_version() {
        let v = Version::initial();
        assert_eq!(v.to_string(), "1.0.0");
        assert!(v.parent_version.is_none());
    }

    #[test]
    fn test_major_bump_resets_minor_and_patch() {
        let mut v = Version::initial();
        v.minor = 4;
        v.patch = 7;
        let next = v.next(VersionBump::Major, "rewrite", "alice");
        assert_eq!(next.as_tuple(), (2, 0, 0));
        assert_eq!(next.parent_version.as_deref(), Some("1.4.7"));
        assert_eq!(next.created_by, "alice");
    }

    #[test]
    fn test_minor_bump_resets_patch() {
        let mut v = Version::initial();
        v.patch = 3;
        let next = v.next(VersionBump::Minor, "", "");
        assert_eq!(next.as_tuple(), (1, 1, 0));
    }

    #[test]
    fn test_patch_bump() {
        let next = Version::initial().next(VersionBump::Patch, "typo", "bob");
        assert_eq!(next.as_tuple(), (1, 0, 1));
        assert_eq!(next.changelog, "typo");
    }

    #[test]
    fn test_parse_triple() {
        assert_eq!(Version::parse_triple("1.2.3"), Some((1, 2, 3)));
        assert_eq!(Version::parse_triple("v2.0.0"), Some((2, 0, 0)));
        assert_eq!(Version::parse_triple("1.2"), None);
        assert_eq!(Version::parse_triple("1.2.3.4"), None);
        assert_eq!(Version::parse_triple("a.b.c"), None);
    }

    #[test]
    fn test_bump_from_str() {
        assert_eq!("MAJOR".parse::<VersionBump>().unwrap(), VersionBump::Major);
        assert_eq!("patch".parse::<VersionBump>().unwrap(), VersionBump::Patch);
        assert!("huge".parse::<VersionBump>().is_err());
    }
}
