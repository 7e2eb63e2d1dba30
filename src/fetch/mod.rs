// src/fetch/mod.rs

//! Source fetching and the checksum-keyed download cache
//!
//! Every source artifact is identified by its declared checksum, never by
//! its URL: a cached file is trusted only after re-verification, and a
//! corrupted entry is discarded and fetched again. Transient download
//! failures are retried with a linear backoff before giving up.

use crate::error::{Error, Result};
use crate::hash::{hash_file, Hash};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of download attempts before a fetch is declared failed
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Base delay between attempts; attempt `n` waits `n * BACKOFF_STEP`
const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Transport for retrieving a URL into a local file
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP(S) transport backed by a blocking reqwest client
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::IoError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::IoError(e.to_string()))?;

        let mut file = fs::File::create(dest)?;
        io::copy(&mut response, &mut file)?;
        Ok(())
    }
}

/// Local-filesystem transport; accepts plain paths and `file://` URLs
pub struct PathFetcher;

impl Fetcher for PathFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        fs::copy(path, dest)?;
        Ok(())
    }
}

/// Checksum-keyed cache of downloaded sources
pub struct SourceCache {
    root: PathBuf,
    fetcher: Box<dyn Fetcher>,
    attempts: u32,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>, fetcher: Box<dyn Fetcher>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            fetcher,
            attempts: DEFAULT_ATTEMPTS,
        })
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Return a verified local copy of `url`, downloading it if the cache
    /// has no entry (or a corrupted one) for `checksum`
    pub fn materialize(&self, url: &str, checksum: &Hash) -> Result<PathBuf> {
        let entry_dir = self.root.join(checksum.algorithm.name()).join(&checksum.value);
        let path = entry_dir.join(filename_for(url));

        if path.is_file() {
            match self.verify(&path, checksum) {
                Ok(()) => {
                    debug!("cache hit for {}", checksum);
                    return Ok(path);
                }
                Err(e) => {
                    warn!("discarding corrupted cache entry {}: {}", path.display(), e);
                    fs::remove_file(&path)?;
                }
            }
        }

        fs::create_dir_all(&entry_dir)?;
        self.download(url, &path, checksum)?;
        Ok(path)
    }

    fn download(&self, url: &str, dest: &Path, checksum: &Hash) -> Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                std::thread::sleep(BACKOFF_STEP * attempt);
            }
            info!("fetching {} (attempt {}/{})", url, attempt, self.attempts);

            let partial = dest.with_extension("part");
            let outcome = self
                .fetcher
                .fetch(url, &partial)
                .and_then(|()| self.verify(&partial, checksum));

            match outcome {
                Ok(()) => {
                    fs::rename(&partial, dest)?;
                    return Ok(());
                }
                Err(e) => {
                    let _ = fs::remove_file(&partial);
                    last_error = e.to_string();
                    warn!("fetch attempt {} failed: {}", attempt, last_error);
                }
            }
        }

        Err(Error::FetchFailure {
            url: url.to_string(),
            attempts: self.attempts,
            detail: last_error,
        })
    }

    fn verify(&self, path: &Path, expected: &Hash) -> Result<()> {
        let actual = hash_file(expected.algorithm, path)?;
        if actual.value != expected.value {
            return Err(Error::ChecksumMismatch {
                expected: expected.to_prefixed_string(),
                actual: actual.to_prefixed_string(),
            });
        }
        Ok(())
    }
}

/// Last path segment of a URL, without any query string
fn filename_for(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    base.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("source")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_bytes, HashAlgorithm};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn checksum_of(data: &[u8]) -> Hash {
        hash_bytes(HashAlgorithm::Sha256, data)
    }

    /// Fetcher that fails the first `failures` calls, then writes `data`
    struct FlakyFetcher {
        data: Vec<u8>,
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    impl Fetcher for FlakyFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(Error::IoError("connection reset".to_string()));
            }
            fs::write(dest, &self.data)?;
            Ok(())
        }
    }

    #[test]
    fn test_path_fetcher_materializes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pkg-1.0.tar.gz");
        fs::write(&src, b"source bytes").unwrap();
        let checksum = checksum_of(b"source bytes");

        let cache = SourceCache::new(dir.path().join("cache"), Box::new(PathFetcher)).unwrap();
        let p1 = cache
            .materialize(src.to_str().unwrap(), &checksum)
            .unwrap();
        assert_eq!(fs::read(&p1).unwrap(), b"source bytes");

        // second call is a pure cache hit even if the origin disappears
        fs::remove_file(&src).unwrap();
        let p2 = cache
            .materialize(src.to_str().unwrap(), &checksum)
            .unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_checksum_mismatch_fails_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pkg.tar.gz");
        fs::write(&src, b"actual content").unwrap();
        let wrong = checksum_of(b"expected content");

        let cache = SourceCache::new(dir.path().join("cache"), Box::new(PathFetcher))
            .unwrap()
            .with_attempts(1);
        let err = cache
            .materialize(src.to_str().unwrap(), &wrong)
            .unwrap_err();
        assert!(matches!(err, Error::FetchFailure { attempts: 1, .. }));
    }

    #[test]
    fn test_corrupted_cache_entry_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("pkg.tar.gz");
        fs::write(&src, b"good bytes").unwrap();
        let checksum = checksum_of(b"good bytes");

        let cache_root = dir.path().join("cache");
        let cache = SourceCache::new(&cache_root, Box::new(PathFetcher)).unwrap();
        let cached = cache
            .materialize(src.to_str().unwrap(), &checksum)
            .unwrap();

        // corrupt the cached copy behind the cache's back
        fs::write(&cached, b"tampered").unwrap();
        let refetched = cache
            .materialize(src.to_str().unwrap(), &checksum)
            .unwrap();
        assert_eq!(fs::read(&refetched).unwrap(), b"good bytes");
    }

    #[test]
    fn test_transient_failures_retried() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = FlakyFetcher {
            data: b"payload".to_vec(),
            failures: 2,
            calls: calls.clone(),
        };
        let checksum = checksum_of(b"payload");

        let cache = SourceCache::new(dir.path().join("cache"), Box::new(fetcher)).unwrap();
        let path = cache
            .materialize("https://example.org/pkg.tar.gz", &checksum)
            .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"payload");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FlakyFetcher {
            data: vec![],
            failures: u32::MAX,
            calls: Arc::new(AtomicU32::new(0)),
        };
        let checksum = checksum_of(b"never arrives");

        let cache = SourceCache::new(dir.path().join("cache"), Box::new(fetcher)).unwrap();
        let err = cache
            .materialize("https://example.org/pkg.tar.gz", &checksum)
            .unwrap_err();
        match err {
            Error::FetchFailure { attempts, .. } => assert_eq!(attempts, DEFAULT_ATTEMPTS),
            other => panic!("expected FetchFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_filename_extraction() {
        assert_eq!(
            filename_for("https://example.org/a/b/pkg-1.0.tar.gz?sig=x"),
            "pkg-1.0.tar.gz"
        );
        assert_eq!(filename_for("file:///tmp/src.zip"), "src.zip");
        assert_eq!(filename_for("https://example.org/"), "source");
    }
}
