//! Depot Error Types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::manifest::ManifestError;
use super::verify::Verdict;
use super::version::VersionError;

#[derive(Error, Debug)]
pub enum DepotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed manifest {}: {source}", path.display())]
    MalformedManifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] VersionError),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Integrity mismatch for {version}: {verdict}")]
    IntegrityMismatch { version: String, verdict: Verdict },

    #[error("No releases available")]
    NoReleasesAvailable,
}

pub type Result<T> = std::result::Result<T, DepotError>;
