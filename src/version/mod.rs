// src/version/mod.rs

//! Version handling and range constraints for package resolution
//!
//! Package versions are dotted strings like `4.228` or `5.0.2-rc1`. One
//! comparison rule covers them all: versions split into numeric and
//! alphabetic segments, numeric segments compare as integers, alphabetic
//! segments sort before any number (so `5.0.2-rc1` precedes `5.0.2`), and
//! trailing zero segments carry no weight (`1.2.0` orders equal to `1.2`).
//! Equality and hashing follow the same rule, so `Ord`, `Eq`, and `Hash`
//! always agree.
//!
//! Ranges support comparison operators (`>= 2.0`), wildcards (`1.*`), and
//! compound ranges (`>= 1.0, < 2.0`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One comparable unit of a version string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Text(String),
    Number(u64),
}

impl Segment {
    // alphabetic segments sort below every number; a missing segment
    // compares as Number(0)
    fn compare(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
        }
    }
}

/// A package version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version {
    raw: String,
}

impl Version {
    /// Parse a version string. Only emptiness is rejected; upstream version
    /// schemes are too varied to validate further.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("empty version".to_string()));
        }
        Ok(Self { raw: s.to_string() })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Dotted components of the version string
    pub fn components(&self) -> Vec<&str> {
        self.raw.split('.').collect()
    }

    /// Break the version into comparable segments: split on `.`, `-`, `_`,
    /// then split each chunk into digit and non-digit runs
    fn segments(&self) -> Vec<Segment> {
        let mut out = Vec::new();
        for chunk in self.raw.split(['.', '-', '_']) {
            let bytes = chunk.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                let digits = bytes[i].is_ascii_digit();
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() == digits {
                    i += 1;
                }
                let piece = &chunk[start..i];
                match piece.parse::<u64>() {
                    Ok(n) if digits => out.push(Segment::Number(n)),
                    _ => out.push(Segment::Text(piece.to_string())),
                }
            }
        }
        out
    }

    /// Compare two versions segment-wise; the shorter side is padded with
    /// zero segments, so `1.2` orders equal to `1.2.0` and before `1.2.1`,
    /// and `1.2-rc1` orders before both
    pub fn compare(&self, other: &Version) -> Ordering {
        let a = self.segments();
        let b = other.segments();
        let pad = Segment::Number(0);
        for i in 0..a.len().max(b.len()) {
            let x = a.get(i).unwrap_or(&pad);
            let y = b.get(i).unwrap_or(&pad);
            let ord = x.compare(y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // trailing zero segments are insignificant in compare, so they
        // must not influence the hash either
        let mut segments = self.segments();
        while segments.last() == Some(&Segment::Number(0)) {
            segments.pop();
        }
        segments.hash(state);
    }
}

/// A version range constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRange {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(Version),
    GreaterThan(Version),
    GreaterOrEqual(Version),
    LessThan(Version),
    LessOrEqual(Version),
    NotEqual(Version),
    /// Prefix wildcard like `1.*` or `2.4.*`
    Wildcard(Vec<String>),
    /// Both constraints must hold (for ranges like `>= 1.0, < 2.0`)
    And(Box<VersionRange>, Box<VersionRange>),
}

impl VersionRange {
    /// Parse a range string
    ///
    /// Examples:
    /// - `*` or empty → `Any`
    /// - `>= 1.2.3`, `< 2.0`, `!= 1.5`, `= 1.5`, `1.5` (exact)
    /// - `1.*` → wildcard on leading components
    /// - `>= 1.0, < 2.0` → compound
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionRange::Any);
        }

        if s.contains(',') {
            let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
            if parts.len() == 2 {
                let left = Self::parse(parts[0])?;
                let right = Self::parse(parts[1])?;
                return Ok(VersionRange::And(Box::new(left), Box::new(right)));
            }
            return Err(Error::ParseError(format!(
                "compound ranges take exactly two parts: '{}'",
                s
            )));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionRange::GreaterOrEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionRange::LessOrEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionRange::NotEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionRange::GreaterThan(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionRange::LessThan(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionRange::Exact(Version::parse(rest)?))
        } else if let Some(prefix) = s.strip_suffix(".*") {
            if prefix.is_empty() {
                return Err(Error::ParseError(format!("invalid wildcard '{}'", s)));
            }
            Ok(VersionRange::Wildcard(
                prefix.split('.').map(|p| p.to_string()).collect(),
            ))
        } else {
            Ok(VersionRange::Exact(Version::parse(s)?))
        }
    }

    /// Check whether a version satisfies this range
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Exact(v) => version == v,
            VersionRange::GreaterThan(v) => version > v,
            VersionRange::GreaterOrEqual(v) => version >= v,
            VersionRange::LessThan(v) => version < v,
            VersionRange::LessOrEqual(v) => version <= v,
            VersionRange::NotEqual(v) => version != v,
            VersionRange::Wildcard(prefix) => {
                let parts = version.components();
                if parts.len() < prefix.len() {
                    return false;
                }
                prefix.iter().zip(parts.iter()).all(|(want, got)| {
                    match (want.parse::<u64>(), got.parse::<u64>()) {
                        (Ok(a), Ok(b)) => a == b,
                        _ => want == got,
                    }
                })
            }
            VersionRange::And(left, right) => {
                left.satisfies(version) && right.satisfies(version)
            }
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionRange::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Any => write!(f, "*"),
            VersionRange::Exact(v) => write!(f, "= {}", v),
            VersionRange::GreaterThan(v) => write!(f, "> {}", v),
            VersionRange::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionRange::LessThan(v) => write!(f, "< {}", v),
            VersionRange::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionRange::NotEqual(v) => write!(f, "!= {}", v),
            VersionRange::Wildcard(prefix) => write!(f, "{}.*", prefix.join(".")),
            VersionRange::And(left, right) => write!(f, "{}, {}", left, right),
        }
    }
}
