// src/error.rs

//! Crate-wide error type and result alias

use std::path::PathBuf;
use thiserror::Error;

use crate::executor::Phase;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by resolution, scheduling, building, and the artifact store
#[derive(Debug, Error)]
pub enum Error {
    /// No version of a package satisfies the intersection of imposed ranges.
    ///
    /// `requesters` lists every "dependent wants range" pair that contributed
    /// to the conflict, so the user can see who disagrees.
    #[error("no version of '{package}' satisfies all constraints: {}", format_requesters(.requesters))]
    UnsatisfiableConstraint {
        package: String,
        requesters: Vec<(String, String)>,
    },

    /// A package directly or transitively depends on itself.
    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// Source download failed after the retry budget was exhausted.
    #[error("fetch of {url} failed after {attempts} attempts: {detail}")]
    FetchFailure {
        url: String,
        attempts: u32,
        detail: String,
    },

    /// A build phase subprocess exited non-zero.
    #[error("{phase} phase failed with exit code {}: {output}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    PhaseFailure {
        phase: Phase,
        exit_code: Option<i32>,
        output: String,
    },

    /// A build phase exceeded its wall-clock timeout and was killed.
    #[error("{phase} phase timed out after {seconds}s")]
    TimeoutFailure { phase: Phase, seconds: u64 },

    /// The store found a different record under an already-committed hash.
    /// Indicates a hashing or concurrency bug; fatal to the whole session.
    #[error("artifact store integrity violation for {hash}: {detail}")]
    CacheIntegrityViolation { hash: String, detail: String },

    /// Downloaded or cached content does not match its declared checksum.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("recipe error in {path}: {detail}")]
    RecipeError { path: PathBuf, detail: String },

    #[error("io error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl Error {
    /// True for errors that doom the whole build session rather than a
    /// single spec and its dependents.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Error::CacheIntegrityViolation { .. })
    }
}

fn format_requesters(requesters: &[(String, String)]) -> String {
    requesters
        .iter()
        .map(|(who, range)| format!("{} wants {}", who, range))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsatisfiable_message_names_requesters() {
        let err = Error::UnsatisfiableConstraint {
            package: "pkgY".to_string(),
            requesters: vec![
                ("pkgX".to_string(), "1.*".to_string()),
                ("<root>".to_string(), ">= 2.0".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("pkgY"));
        assert!(msg.contains("pkgX wants 1.*"));
        assert!(msg.contains("<root> wants >= 2.0"));
    }

    #[test]
    fn test_cycle_message_shows_path() {
        let err = Error::CyclicDependency(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_session_fatal_classification() {
        let integrity = Error::CacheIntegrityViolation {
            hash: "abc".to_string(),
            detail: "record differs".to_string(),
        };
        assert!(integrity.is_session_fatal());

        let phase = Error::PhaseFailure {
            phase: Phase::Configure,
            exit_code: Some(1),
            output: String::new(),
        };
        assert!(!phase.is_session_fatal());
    }
}
