// src/spec/mod.rs

//! Concrete specs: fully resolved build configurations
//!
//! A `ConcreteSpec` pins everything that affects the produced artifact:
//! name, version, variant assignment, toolchain, and the identity hashes of
//! all direct dependencies. Its own identity is a SHA-256 over a canonical
//! rendering, so equal hashes mean interchangeable artifacts.

use crate::hash::{hash_bytes, Hash, HashAlgorithm};
use crate::recipe::DepKind;
use crate::variant::{VariantAssignment, VariantConstraint};
use crate::version::{Version, VersionRange};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiler and platform a spec is built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub compiler: String,
    pub platform: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: "gcc".to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{} {}", self.compiler, self.platform)
    }
}

/// A direct dependency reference inside a concrete spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepRef {
    pub name: String,
    /// Spec hash of the resolved dependency
    pub hash: String,
    pub kind: DepKind,
}

/// A fully resolved instantiation of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteSpec {
    pub name: String,
    pub version: Version,
    pub variants: VariantAssignment,
    pub toolchain: Toolchain,
    /// Direct dependencies, sorted by name
    pub dependencies: Vec<DepRef>,
    /// Identity hash over all fields above
    hash: String,
}

impl ConcreteSpec {
    /// Construct a spec, canonicalizing dependency order and computing the
    /// identity hash
    pub fn new(
        name: impl Into<String>,
        version: Version,
        variants: VariantAssignment,
        toolchain: Toolchain,
        mut dependencies: Vec<DepRef>,
    ) -> Self {
        dependencies.sort_by(|a, b| a.name.cmp(&b.name));
        let name = name.into();
        let hash = Self::compute_hash(&name, &version, &variants, &toolchain, &dependencies);
        Self {
            name,
            version,
            variants,
            toolchain,
            dependencies,
            hash,
        }
    }

    fn compute_hash(
        name: &str,
        version: &Version,
        variants: &VariantAssignment,
        toolchain: &Toolchain,
        dependencies: &[DepRef],
    ) -> String {
        let mut canonical = format!(
            "{}@{}\nvariants={}\ntoolchain={}/{}\n",
            name, version, variants, toolchain.compiler, toolchain.platform
        );
        for dep in dependencies {
            canonical.push_str(&format!("dep={}:{}:{}\n", dep.name, dep.kind.as_str(), dep.hash));
        }
        hash_bytes(HashAlgorithm::Sha256, canonical.as_bytes())
            .value
    }

    /// The spec's identity hash (lowercase hex SHA-256)
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Short prefix of the hash, for logs and display
    pub fn short_hash(&self) -> &str {
        &self.hash[..8.min(self.hash.len())]
    }

    /// `name@version` rendering without variants or toolchain
    pub fn name_version(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for ConcreteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}{}", self.name, self.version, self.variants)?;
        write!(f, " {}", self.toolchain)
    }
}

/// A user-supplied root request: package name plus optional constraints
///
/// Syntax: `name[@range][+variant=value]...`, e.g. `pkgX@>=2.0+ssl=on`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRequest {
    pub name: String,
    pub range: VersionRange,
    pub variants: Vec<VariantConstraint>,
}

impl RootRequest {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("empty package request".to_string()));
        }

        // variants come after the first '+'
        let (head, variant_part) = match s.find('+') {
            Some(idx) => (&s[..idx], Some(&s[idx..])),
            None => (s, None),
        };

        let (name, range) = match head.split_once('@') {
            Some((name, range_str)) => (name, VersionRange::parse(range_str)?),
            None => (head, VersionRange::Any),
        };

        if name.is_empty() {
            return Err(Error::ParseError(format!(
                "request '{}' has no package name",
                s
            )));
        }

        let mut variants = Vec::new();
        if let Some(part) = variant_part {
            for item in part.split('+').filter(|p| !p.is_empty()) {
                variants.push(VariantConstraint::parse(item)?);
            }
        }

        Ok(Self {
            name: name.to_string(),
            range,
            variants,
        })
    }
}

impl fmt::Display for RootRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.range != VersionRange::Any {
            write!(f, "@{}", self.range)?;
        }
        for vc in &self.variants {
            write!(f, "+{}", vc)?;
        }
        Ok(())
    }
}
