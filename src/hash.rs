// src/hash.rs

//! Configurable hashing for content checksums and spec identity
//!
//! Two algorithms cover the crate's needs:
//! - **SHA-256**: source-archive checksums and concrete-spec identity,
//!   where collision resistance matters
//! - **XXH128**: install-manifest file hashes, where only fast content
//!   comparison is needed

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_128;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256, cryptographic. Used for source checksums and spec hashes.
    #[default]
    Sha256,
    /// XXH128, non-cryptographic but very fast. Used for manifest entries.
    Xxh128,
}

impl HashAlgorithm {
    /// Hex string length for this algorithm's output
    #[inline]
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Xxh128 => 32,
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Xxh128 => "xxh128",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "xxh128" | "xxh3" => Ok(Self::Xxh128),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Hash parsing/validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    UnknownAlgorithm(String),
    InvalidLength { expected: usize, got: usize },
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// A hash value paired with its algorithm, stored as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Hash {
    /// Create a validated hash value
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        let expected = algorithm.hex_len();
        if value.len() != expected {
            return Err(HashError::InvalidLength {
                expected,
                got: value.len(),
            });
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }
        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    fn new_unchecked(algorithm: HashAlgorithm, value: String) -> Self {
        Self { algorithm, value }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Parse a prefixed hash string, e.g. `sha256:ab12...`.
    /// Unprefixed strings default to SHA-256.
    pub fn parse_prefixed(s: &str) -> Result<Self, HashError> {
        if let Some((algo, hash)) = s.split_once(':') {
            let algorithm = algo.parse()?;
            Self::new(algorithm, hash)
        } else {
            Self::new(HashAlgorithm::Sha256, s)
        }
    }

    /// Format as `algo:hex`
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm, self.value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefixed_string())
    }
}

/// Hash an in-memory byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Hash {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(bytes);
            Hash::new_unchecked(algorithm, hex::encode(digest))
        }
        HashAlgorithm::Xxh128 => {
            let digest = xxh3_128(bytes);
            Hash::new_unchecked(algorithm, format!("{:032x}", digest))
        }
    }
}

/// Hash a file by streaming its contents
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Hash> {
    let mut file = File::open(path)?;
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(Hash::new_unchecked(algorithm, hex::encode(hasher.finalize())))
        }
        HashAlgorithm::Xxh128 => {
            // manifest entries are small enough to read whole
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            Ok(hash_bytes(algorithm, &bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let h = hash_bytes(HashAlgorithm::Sha256, b"hello");
        assert_eq!(
            h.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_bytes(HashAlgorithm::Xxh128, b"content");
        let b = hash_bytes(HashAlgorithm::Xxh128, b"content");
        assert_eq!(a, b);
        assert_eq!(a.value.len(), HashAlgorithm::Xxh128.hex_len());
    }

    #[test]
    fn test_parse_prefixed_roundtrip() {
        let h = hash_bytes(HashAlgorithm::Sha256, b"x");
        let parsed = Hash::parse_prefixed(&h.to_prefixed_string()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_parse_unprefixed_defaults_to_sha256() {
        let hex64 = "a".repeat(64);
        let h = Hash::parse_prefixed(&hex64).unwrap();
        assert_eq!(h.algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn test_invalid_length_rejected() {
        let err = Hash::new(HashAlgorithm::Sha256, "abcd").unwrap_err();
        assert!(matches!(err, HashError::InvalidLength { .. }));
    }

    #[test]
    fn test_invalid_hex_rejected() {
        let bad = "z".repeat(64);
        let err = Hash::new(HashAlgorithm::Sha256, bad).unwrap_err();
        assert!(matches!(err, HashError::InvalidHex(_)));
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"some file content").unwrap();

        let from_file = hash_file(HashAlgorithm::Sha256, &path).unwrap();
        let from_bytes = hash_bytes(HashAlgorithm::Sha256, b"some file content");
        assert_eq!(from_file, from_bytes);
    }
}
