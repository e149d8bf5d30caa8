//! # Component Versions
//!
//! Versions shaped `major.minor.release.timestamp[-suffix]`, e.g.
//! `1.203.1.20210908-220956`. Ordering is lexicographic on
//! (major, minor, release, timestamp, suffix).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

const VERSION_PATTERN: &str = r"^(\d+)\.(\d+)\.(\d+)\.(\d+)(?:-(\d+))?$";

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("malformed version '{0}'")]
    Malformed(String),
    #[error("version component out of range in '{0}'")]
    OutOfRange(String),
    #[error("failed to compile version pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub release: u64,
    pub timestamp: u64,
    pub suffix: Option<u64>,
    /// Digits of the suffix as written, leading zeros included
    suffix_width: usize,
}

impl Version {
    fn key(&self) -> (u64, u64, u64, u64, Option<u64>) {
        (self.major, self.minor, self.release, self.timestamp, self.suffix)
    }

    /// Whether moving from `self` to `next` goes backwards
    pub fn is_downgrade_to(&self, next: &Version) -> bool {
        next < self
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = Regex::new(VERSION_PATTERN)?;
        let captures = pattern
            .captures(s.trim())
            .ok_or_else(|| VersionError::Malformed(s.to_string()))?;
        let number = |index: usize| -> Result<u64, VersionError> {
            captures[index]
                .parse()
                .map_err(|_| VersionError::OutOfRange(s.to_string()))
        };
        let suffix_width = captures.get(5).map_or(0, |m| m.as_str().len());
        let suffix = match captures.get(5) {
            Some(m) => Some(
                m.as_str()
                    .parse()
                    .map_err(|_| VersionError::OutOfRange(s.to_string()))?,
            ),
            None => None,
        };
        Ok(Version {
            major: number(1)?,
            minor: number(2)?,
            release: number(3)?,
            timestamp: number(4)?,
            suffix,
            suffix_width,
        })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.release, self.timestamp
        )?;
        if let Some(suffix) = self.suffix {
            write!(f, "-{suffix:0width$}", width = self.suffix_width)?;
        }
        Ok(())
    }
}

/// Version from the tag of an image reference, if the tag is a version
pub fn from_image(image: &str) -> Option<Version> {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_segment = without_digest.rsplit('/').next().unwrap_or(without_digest);
    let (_, tag) = last_segment.rsplit_once(':')?;
    tag.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let v: Version = "1.203.1.20210908-220956".parse().unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 203);
        assert_eq!(v.release, 1);
        assert_eq!(v.timestamp, 20_210_908);
        assert_eq!(v.suffix, Some(220_956));
        assert_eq!(v.to_string(), "1.203.1.20210908-220956");
    }

    #[test]
    fn test_rejects_malformed() {
        for input in ["", "latest", "1.2.3", "1.2.3.x", "1.2.3.4-", "v1.2.3.4"] {
            assert!(
                matches!(input.parse::<Version>(), Err(VersionError::Malformed(_))),
                "{input} should be rejected"
            );
        }
        assert!(matches!(
            "99999999999999999999.1.1.1".parse::<Version>(),
            Err(VersionError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_downgrade_detection() {
        let stored: Version = "1.203.1.20210908-220956".parse().unwrap();
        let new: Version = "1.203.0.20200908-220956".parse().unwrap();
        assert!(stored.is_downgrade_to(&new));
        assert!(!new.is_downgrade_to(&stored));
        assert!(!stored.is_downgrade_to(&stored.clone()));
    }

    #[test]
    fn test_display_keeps_tag_text() {
        for tag in ["1.2.3.4-5", "1.203.1.20210908-000956", "1.290.0.20240101", "1.2.3.4-000000"] {
            let v: Version = tag.parse().unwrap();
            assert_eq!(v.to_string(), tag);
        }
        let short: Version = "1.2.3.4-5".parse().unwrap();
        let padded: Version = "1.2.3.4-000005".parse().unwrap();
        assert_eq!(short, padded);
    }

    #[test]
    fn test_ordering_is_numeric() {
        let a: Version = "1.9.0.20210101".parse().unwrap();
        let b: Version = "1.10.0.20200101".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_from_image() {
        assert_eq!(
            from_image("registry:5000/linux/activegate:1.203.1.20210908-220956"),
            "1.203.1.20210908-220956".parse().ok()
        );
        assert_eq!(from_image("registry:5000/linux/activegate"), None);
        assert_eq!(from_image("tenant/linux/activegate:latest"), None);
    }
}
