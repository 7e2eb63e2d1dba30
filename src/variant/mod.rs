// src/variant/mod.rs

//! Variant declarations, constraints, and canonical assignments
//!
//! A variant is a named build-time option with a finite value set and a
//! default (`optimize = { values = ["0", "2", "3"], default = "2" }`).
//! Resolution picks exactly one value per declared variant; assignments are
//! kept canonically sorted so rendering, hashing, and comparison are
//! deterministic.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A variant declaration on a recipe: allowed values plus a default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDef {
    /// Allowed values, in declaration order
    pub values: Vec<String>,
    /// Value used when no requester constrains this variant
    pub default: String,
}

impl VariantDef {
    /// Validate that the default is one of the allowed values
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.values.is_empty() {
            return Err(Error::ParseError(format!(
                "variant '{}' declares no values",
                name
            )));
        }
        if !self.values.contains(&self.default) {
            return Err(Error::ParseError(format!(
                "variant '{}' default '{}' is not among its values",
                name, self.default
            )));
        }
        Ok(())
    }

    pub fn allows(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// A requester's demand that a variant take a specific value
///
/// Serialized as the string form `name=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantConstraint {
    pub name: String,
    pub value: String,
}

impl VariantConstraint {
    /// Parse `name=value` (a leading `+` is tolerated, matching the
    /// request syntax)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('+');
        let (name, value) = s.split_once('=').ok_or_else(|| {
            Error::ParseError(format!("variant constraint '{}' is not name=value", s))
        })?;
        if name.is_empty() || value.is_empty() {
            return Err(Error::ParseError(format!(
                "variant constraint '{}' has an empty side",
                s
            )));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for VariantConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

impl Serialize for VariantConstraint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VariantConstraint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VariantConstraint::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A concrete, canonically sorted variant assignment
///
/// Backed by a `BTreeMap` so iteration and rendering order are always
/// lexicographic by variant name.
#[derive(Debug, Clone, PartialEq, Eq, Default, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantAssignment {
    values: BTreeMap<String, String>,
}

impl VariantAssignment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    /// Iterate in canonical (lexicographic) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check that every constraint is met by this assignment
    pub fn satisfies(&self, constraints: &[VariantConstraint]) -> bool {
        constraints
            .iter()
            .all(|c| self.get(&c.name) == Some(c.value.as_str()))
    }
}

impl fmt::Display for VariantAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.values {
            write!(f, "+{}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_def_validate() {
        let def = VariantDef {
            values: vec!["on".to_string(), "off".to_string()],
            default: "on".to_string(),
        };
        assert!(def.validate("ssl").is_ok());
        assert!(def.allows("off"));
        assert!(!def.allows("maybe"));
    }

    #[test]
    fn test_variant_def_rejects_bad_default() {
        let def = VariantDef {
            values: vec!["on".to_string()],
            default: "off".to_string(),
        };
        assert!(def.validate("ssl").is_err());
    }

    #[test]
    fn test_constraint_parse() {
        let c = VariantConstraint::parse("+ssl=on").unwrap();
        assert_eq!(c.name, "ssl");
        assert_eq!(c.value, "on");

        let c = VariantConstraint::parse("threads=off").unwrap();
        assert_eq!(c.name, "threads");

        assert!(VariantConstraint::parse("ssl").is_err());
        assert!(VariantConstraint::parse("=on").is_err());
    }

    #[test]
    fn test_assignment_canonical_order() {
        let mut a = VariantAssignment::empty();
        a.set("zlib", "on");
        a.set("abi", "cxx11");
        assert_eq!(a.to_string(), "+abi=cxx11+zlib=on");

        // insertion order does not matter
        let mut b = VariantAssignment::empty();
        b.set("abi", "cxx11");
        b.set("zlib", "on");
        assert_eq!(a, b);
    }

    #[test]
    fn test_assignment_satisfies() {
        let mut a = VariantAssignment::empty();
        a.set("ssl", "on");
        a.set("threads", "off");

        let ok = vec![VariantConstraint::parse("ssl=on").unwrap()];
        let bad = vec![VariantConstraint::parse("threads=on").unwrap()];
        assert!(a.satisfies(&ok));
        assert!(!a.satisfies(&bad));
        assert!(a.satisfies(&[]));
    }
}
