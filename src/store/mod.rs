// src/store/mod.rs

//! Content-addressed artifact store
//!
//! One directory per spec hash: `<root>/<hash>/` holds `record.json` (the
//! build record), `build.log`, and `image/` (the installed file tree).
//! Entries are write-once: builds land in a staging directory first and are
//! committed with an atomic rename under a per-hash file lock, so a crash
//! mid-build never leaves a half-written entry and concurrent builders of
//! the same hash cannot trample each other. A commit that disagrees with an
//! already-committed record is an integrity violation and aborts the whole
//! session.

use crate::error::{Error, Result};
use crate::hash::{hash_file, HashAlgorithm};
use crate::spec::ConcreteSpec;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const RECORD_FILE: &str = "record.json";
const LOG_FILE: &str = "build.log";
const IMAGE_DIR: &str = "image";
const STAGING_DIR: &str = ".staging";
const LOCKS_DIR: &str = ".locks";

/// One file in an installed image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the image root
    pub path: String,
    pub size: u64,
    /// XXH128 of the file contents
    pub xxh128: String,
}

/// The durable record of one completed build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub spec: ConcreteSpec,
    pub built_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Installed files, sorted by path
    pub manifest: Vec<ManifestEntry>,
}

impl ArtifactRecord {
    /// True when two records describe interchangeable artifacts
    fn matches(&self, other: &ArtifactRecord) -> bool {
        self.spec.hash() == other.spec.hash() && self.manifest == other.manifest
    }
}

/// A build in progress: files installed here are either committed into the
/// store or discarded when the stage is dropped
pub struct StagedBuild {
    hash: String,
    dir: PathBuf,
    committed: bool,
}

impl StagedBuild {
    /// Where the executor should install files (DESTDIR)
    pub fn image_dir(&self) -> PathBuf {
        self.dir.join(IMAGE_DIR)
    }
}

impl Drop for StagedBuild {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// The on-disk artifact store
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        fs::create_dir_all(root.join(LOCKS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// Image directory of a committed entry
    pub fn image_dir(&self, hash: &str) -> PathBuf {
        self.entry_dir(hash).join(IMAGE_DIR)
    }

    pub fn log_path(&self, hash: &str) -> PathBuf {
        self.entry_dir(hash).join(LOG_FILE)
    }

    /// True if a completed build exists for this hash
    pub fn contains(&self, hash: &str) -> bool {
        self.entry_dir(hash).join(RECORD_FILE).is_file()
    }

    /// Load the record of a committed entry
    pub fn load_record(&self, hash: &str) -> Result<ArtifactRecord> {
        let path = self.entry_dir(hash).join(RECORD_FILE);
        let content = fs::read_to_string(&path).map_err(|_| {
            Error::NotFound(format!("no artifact record for {}", hash))
        })?;
        serde_json::from_str(&content).map_err(|e| Error::CacheIntegrityViolation {
            hash: hash.to_string(),
            detail: format!("unreadable record: {}", e),
        })
    }

    /// All committed records, in hash order
    pub fn records(&self) -> Result<Vec<ArtifactRecord>> {
        let mut hashes: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.path().join(RECORD_FILE).is_file() {
                hashes.push(name);
            }
        }
        hashes.sort();
        hashes.iter().map(|h| self.load_record(h)).collect()
    }

    /// Open a staging area for a build of `hash`
    pub fn stage(&self, hash: &str) -> Result<StagedBuild> {
        static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.{}.{}", hash, process::id(), seq));
        if dir.exists() {
            // leftover from a crashed builder with our pid recycled
            warn!("removing stale staging dir {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(dir.join(IMAGE_DIR))?;
        Ok(StagedBuild {
            hash: hash.to_string(),
            dir,
            committed: false,
        })
    }

    /// Commit a staged build: write the record and log, then atomically
    /// rename the staging directory into place.
    ///
    /// Committing a hash that already exists is a no-op when the existing
    /// record matches, and a fatal integrity violation when it does not.
    pub fn commit(
        &self,
        mut staged: StagedBuild,
        spec: &ConcreteSpec,
        log: &str,
        duration_secs: f64,
    ) -> Result<ArtifactRecord> {
        let hash = staged.hash.clone();
        let record = ArtifactRecord {
            spec: spec.clone(),
            built_at: Utc::now(),
            duration_secs,
            manifest: build_manifest(&staged.image_dir())?,
        };

        let _lock = self.lock_entry(&hash)?;

        if self.contains(&hash) {
            let existing = self.load_record(&hash)?;
            if existing.matches(&record) {
                debug!("entry {} already committed, discarding duplicate", hash);
                return Ok(existing);
            }
            return Err(Error::CacheIntegrityViolation {
                hash,
                detail: "a different record is already committed under this hash".to_string(),
            });
        }

        fs::write(
            staged.dir.join(RECORD_FILE),
            serde_json::to_string_pretty(&record)
                .map_err(|e| Error::IoError(e.to_string()))?,
        )?;
        fs::write(staged.dir.join(LOG_FILE), log)?;

        fs::rename(&staged.dir, self.entry_dir(&hash))?;
        staged.committed = true;

        info!(
            "committed {} [{}] ({} files)",
            record.spec.name_version(),
            &hash[..12.min(hash.len())],
            record.manifest.len()
        );
        Ok(record)
    }

    /// Exclusive per-hash lock; released when the returned handle drops
    fn lock_entry(&self, hash: &str) -> Result<fs::File> {
        let path = self.root.join(LOCKS_DIR).join(format!("{}.lock", hash));
        let file = fs::File::create(&path)?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

/// Walk an image tree and hash every regular file, sorted by relative path
fn build_manifest(image: &Path) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(image).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(image)
            .map_err(|e| Error::IoError(e.to_string()))?;
        let meta = entry.metadata().map_err(|e| Error::IoError(e.to_string()))?;
        let hash = hash_file(HashAlgorithm::Xxh128, entry.path())?;
        entries.push(ManifestEntry {
            path: rel.to_string_lossy().into_owned(),
            size: meta.len(),
            xxh128: hash.value,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Toolchain;
    use crate::variant::VariantAssignment;
    use crate::version::Version;

    fn spec(name: &str, version: &str) -> ConcreteSpec {
        ConcreteSpec::new(
            name,
            Version::parse(version).unwrap(),
            VariantAssignment::empty(),
            Toolchain {
                compiler: "gcc".to_string(),
                platform: "linux-x86_64".to_string(),
            },
            vec![],
        )
    }

    fn install(staged: &StagedBuild, rel: &str, content: &[u8]) {
        let path = staged.image_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_commit_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let s = spec("zlib", "1.3");

        let staged = store.stage(s.hash()).unwrap();
        install(&staged, "usr/lib/libz.so", b"library bytes");
        install(&staged, "usr/include/zlib.h", b"header");
        let record = store.commit(staged, &s, "build log text", 1.5).unwrap();

        assert!(store.contains(s.hash()));
        assert_eq!(record.manifest.len(), 2);
        assert_eq!(record.manifest[0].path, "usr/include/zlib.h");

        let loaded = store.load_record(s.hash()).unwrap();
        assert_eq!(loaded.spec.hash(), s.hash());
        assert!(store.image_dir(s.hash()).join("usr/lib/libz.so").is_file());
        assert_eq!(
            fs::read_to_string(store.log_path(s.hash())).unwrap(),
            "build log text"
        );
    }

    #[test]
    fn test_identical_duplicate_commit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let s = spec("zlib", "1.3");

        let staged = store.stage(s.hash()).unwrap();
        install(&staged, "usr/bin/tool", b"v1");
        let first = store.commit(staged, &s, "log", 1.0).unwrap();

        let staged = store.stage(s.hash()).unwrap();
        install(&staged, "usr/bin/tool", b"v1");
        let second = store.commit(staged, &s, "log", 2.0).unwrap();

        // the original record survives untouched
        assert_eq!(first.built_at, second.built_at);
    }

    #[test]
    fn test_conflicting_commit_is_integrity_violation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let s = spec("zlib", "1.3");

        let staged = store.stage(s.hash()).unwrap();
        install(&staged, "usr/bin/tool", b"v1");
        store.commit(staged, &s, "log", 1.0).unwrap();

        let staged = store.stage(s.hash()).unwrap();
        install(&staged, "usr/bin/tool", b"different contents");
        let err = store.commit(staged, &s, "log", 1.0).unwrap_err();
        assert!(matches!(err, Error::CacheIntegrityViolation { .. }));
        assert!(err.is_session_fatal());
    }

    #[test]
    fn test_dropped_stage_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let s = spec("zlib", "1.3");

        {
            let staged = store.stage(s.hash()).unwrap();
            install(&staged, "usr/bin/tool", b"partial");
        }
        assert!(!store.contains(s.hash()));
        let staging = dir.path().join(STAGING_DIR);
        assert_eq!(fs::read_dir(staging).unwrap().count(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let s = spec("pcre", "8.45");
        {
            let store = ArtifactStore::open(dir.path()).unwrap();
            let staged = store.stage(s.hash()).unwrap();
            install(&staged, "usr/lib/libpcre.a", b"archive");
            store.commit(staged, &s, "log", 3.0).unwrap();
        }

        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(store.contains(s.hash()));
        let records = store.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spec.name, "pcre");
    }

    #[test]
    fn test_manifest_sorted_and_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let s = spec("tool", "1.0");

        let staged = store.stage(s.hash()).unwrap();
        install(&staged, "z/last", b"zz");
        install(&staged, "a/first", b"aa");
        let record = store.commit(staged, &s, "", 0.1).unwrap();

        let paths: Vec<&str> = record.manifest.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["a/first", "z/last"]);
        assert_eq!(record.manifest[0].xxh128.len(), 32);
        assert_eq!(record.manifest[0].size, 2);
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        assert!(!store.contains(&"f".repeat(64)));
        assert!(matches!(
            store.load_record(&"f".repeat(64)),
            Err(Error::NotFound(_))
        ));
    }
}
