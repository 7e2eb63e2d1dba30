// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files describing a buildable package: its available
//! versions (with source checksums), variant options, dependency edges,
//! build-phase commands, hooks, and patches. A recipe is loaded once and
//! never mutated afterwards.
//!
//! ```toml
//! [package]
//! name = "verilator"
//! url = "https://example.org/verilator-%(version)s.tar.gz"
//!
//! [[versions]]
//! version = "5.002"
//! sha256 = "72d6..."
//!
//! [variants.threads]
//! values = ["on", "off"]
//! default = "on"
//!
//! [[dependencies]]
//! name = "flex"
//! range = "*"
//! kind = "build-and-run"
//!
//! [[hooks]]
//! phase = "autoreconf"
//! when = "replace"
//! run = "autoconf"
//! ```

use crate::error::{Error, Result};
use crate::executor::Phase;
use crate::hash::Hash;
use crate::variant::{VariantConstraint, VariantDef};
use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default phase command templates (autotools-style)
pub const DEFAULT_CONFIGURE: &str = "./configure --prefix=%(prefix)s";
pub const DEFAULT_BUILD: &str = "make -j%(jobs)s";
pub const DEFAULT_INSTALL: &str = "make install DESTDIR=%(destdir)s";

/// A complete package recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Available versions, each with a content checksum
    pub versions: Vec<VersionEntry>,

    /// Variant declarations, keyed by variant name
    #[serde(default)]
    pub variants: BTreeMap<String, VariantDef>,

    /// Declared dependency edges
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,

    /// Phase command overrides
    #[serde(default)]
    pub build: BuildSection,

    /// Ordered build hooks (phase overrides and wrappers)
    #[serde(default)]
    pub hooks: Vec<Hook>,

    /// Patches applied after fetch, in order
    #[serde(default)]
    pub patches: Vec<PatchDecl>,
}

impl Recipe {
    /// Validate internal consistency after load
    pub fn validate(&self) -> Result<()> {
        if self.versions.is_empty() {
            return Err(Error::ParseError(format!(
                "recipe '{}' declares no versions",
                self.package.name
            )));
        }
        for entry in &self.versions {
            entry.checksum()?;
        }
        for (name, def) in &self.variants {
            def.validate(name)?;
        }
        for dep in &self.dependencies {
            for vc in &dep.variants {
                // a dependency may only constrain variants by name=value;
                // whether the target declares them is checked at resolve time
                if vc.name.is_empty() {
                    return Err(Error::ParseError(format!(
                        "recipe '{}' has an empty variant constraint on '{}'",
                        self.package.name, dep.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Versions sorted descending (highest first), the solver's preference order
    pub fn versions_descending(&self) -> Vec<&VersionEntry> {
        let mut entries: Vec<&VersionEntry> = self.versions.iter().collect();
        entries.sort_by(|a, b| b.version.cmp(&a.version));
        entries
    }

    /// Find the entry for an exact version
    pub fn version_entry(&self, version: &Version) -> Option<&VersionEntry> {
        self.versions.iter().find(|e| &e.version == version)
    }

    /// Substitute `%(name)s` template variables in a phase command
    pub fn substitute(
        &self,
        template: &str,
        version: &Version,
        prefix: &str,
        destdir: &str,
        jobs: u32,
    ) -> String {
        template
            .replace("%(name)s", &self.package.name)
            .replace("%(version)s", version.as_str())
            .replace("%(prefix)s", prefix)
            .replace("%(destdir)s", destdir)
            .replace("%(jobs)s", &jobs.to_string())
    }

    /// Source URL for a version, with `%(version)s` substituted
    pub fn source_url(&self, version: &Version) -> String {
        self.package
            .url
            .replace("%(version)s", version.as_str())
            .replace("%(name)s", &self.package.name)
    }

    /// The command template for a phase: recipe override, else the
    /// autotools-style default
    pub fn phase_command(&self, phase: Phase) -> Option<&str> {
        match phase {
            Phase::Configure => Some(self.build.configure.as_deref().unwrap_or(DEFAULT_CONFIGURE)),
            Phase::Build => Some(self.build.build.as_deref().unwrap_or(DEFAULT_BUILD)),
            Phase::Install => Some(self.build.install.as_deref().unwrap_or(DEFAULT_INSTALL)),
            // no default; runs only when a hook supplies a command
            Phase::Autoreconf => None,
            Phase::Fetch | Phase::Patch => None,
        }
    }

    /// Hooks declared for a phase, in declaration order
    pub fn hooks_for(&self, phase: Phase) -> Vec<&Hook> {
        self.hooks.iter().filter(|h| h.phase == phase).collect()
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// Source archive URL template (`%(version)s` substitution)
    pub url: String,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Short description
    #[serde(default)]
    pub summary: Option<String>,
}

/// One available version with its source checksum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: Version,
    /// Hex SHA-256 of the source archive
    pub sha256: String,
}

impl VersionEntry {
    /// The checksum as a validated `Hash`
    pub fn checksum(&self) -> Result<Hash> {
        Hash::parse_prefixed(&self.sha256)
            .map_err(|e| Error::ParseError(format!("bad checksum for {}: {}", self.version, e)))
    }
}

/// Dependency kind: when the target must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DepKind {
    /// Needed only while building the dependent
    Build,
    /// Needed only at run time
    Run,
    /// Needed both to build and to run
    #[default]
    BuildAndRun,
}

impl DepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Run => "run",
            Self::BuildAndRun => "build-and-run",
        }
    }
}

/// A declared dependency edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDecl {
    /// Target package name
    pub name: String,

    /// Version range the target must satisfy
    #[serde(default = "any_range")]
    pub range: VersionRange,

    /// Variant constraints imposed on the target (`["ssl=on"]`)
    #[serde(default)]
    pub variants: Vec<VariantConstraint>,

    /// Dependency kind
    #[serde(default)]
    pub kind: DepKind,
}

fn any_range() -> VersionRange {
    VersionRange::Any
}

/// Phase command overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildSection {
    #[serde(default)]
    pub configure: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub install: Option<String>,
}

/// Where a hook runs relative to the phase's own command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookWhen {
    Before,
    After,
    Replace,
}

/// A named extension point: a shell command attached to a build phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub phase: Phase,
    pub when: HookWhen,
    pub run: String,
}

/// A patch to apply to the unpacked source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDecl {
    /// Local path or URL of the patch file
    pub file: String,

    /// Checksum, required for remote patches
    #[serde(default)]
    pub sha256: Option<String>,

    /// `-p` strip level
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_strip() -> u32 {
    1
}
