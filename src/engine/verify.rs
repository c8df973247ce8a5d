//! Integrity Verification
//!
//! Streams artifact files through SHA256 and compares the measured
//! size/hash against what a manifest declares.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::error::Result;
use super::manifest::ReleaseManifest;

const CHUNK_SIZE: usize = 64 * 1024;

/// Measured properties of an artifact on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measurement {
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeMismatch {
    pub expected: u64,
    pub actual: u64,
    pub diff_bytes: u64,
    pub diff_percent: f64,
}

impl SizeMismatch {
    pub fn new(expected: u64, actual: u64) -> Self {
        let diff_bytes = expected.abs_diff(actual);
        let diff_percent = if expected == 0 {
            0.0
        } else {
            diff_bytes as f64 / expected as f64 * 100.0
        };
        Self {
            expected,
            actual,
            diff_bytes,
            diff_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashMismatch {
    pub expected: String,
    pub actual: String,
}

/// Result of comparing a manifest against its artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Match,
    SizeMismatch(SizeMismatch),
    HashMismatch(HashMismatch),
    Both {
        size: SizeMismatch,
        hash: HashMismatch,
    },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    pub fn size_mismatch(&self) -> Option<&SizeMismatch> {
        match self {
            Self::SizeMismatch(size) | Self::Both { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn hash_mismatch(&self) -> Option<&HashMismatch> {
        match self {
            Self::HashMismatch(hash) | Self::Both { hash, .. } => Some(hash),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match() {
            return write!(f, "size and sha256 match");
        }
        let mut parts = Vec::new();
        if let Some(size) = self.size_mismatch() {
            parts.push(format!(
                "size expected {} got {} ({} bytes, {:.4}%)",
                size.expected, size.actual, size.diff_bytes, size.diff_percent
            ));
        }
        if let Some(hash) = self.hash_mismatch() {
            parts.push(format!("sha256 expected {} got {}", hash.expected, hash.actual));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Verifier for release artifacts
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Measure size and SHA256 of a file without reading it into memory at once
    pub fn measure(path: &Path) -> Result<Measurement> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            size += bytes_read as u64;
        }

        Ok(Measurement {
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    /// Compare an expected size/hash pair against a measurement
    pub fn compare(expected_size: u64, expected_sha256: &str, actual: &Measurement) -> Verdict {
        let size = (expected_size != actual.size)
            .then(|| SizeMismatch::new(expected_size, actual.size));
        let hash = (!expected_sha256.eq_ignore_ascii_case(&actual.sha256)).then(|| HashMismatch {
            expected: expected_sha256.to_string(),
            actual: actual.sha256.clone(),
        });

        match (size, hash) {
            (None, None) => Verdict::Match,
            (Some(size), None) => Verdict::SizeMismatch(size),
            (None, Some(hash)) => Verdict::HashMismatch(hash),
            (Some(size), Some(hash)) => Verdict::Both { size, hash },
        }
    }

    /// Measure an artifact and compare it with its manifest
    pub fn verify_manifest(manifest: &ReleaseManifest, artifact: &Path) -> Result<Verdict> {
        let measured = Self::measure(artifact)?;
        Ok(Self::compare(manifest.size, &manifest.sha256, &measured))
    }
}
