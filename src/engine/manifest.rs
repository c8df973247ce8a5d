//! Release Manifest
//!
//! The per-version `version.json` document: what the update server tells
//! clients about a release, and what the checker compares against the
//! artifact bytes on disk.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use super::error::{DepotError, Result};
use super::version::Version;

/// Manifest validation errors, always naming the offending field
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("field `{field}`: {reason}")]
    Field { field: &'static str, reason: String },
}

impl ManifestError {
    fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Field {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field, if the failure was field-level
    pub fn field_name(&self) -> Option<&'static str> {
        match self {
            Self::Field { field, .. } => Some(field),
            Self::Syntax(_) => None,
        }
    }
}

/// One published release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "RawManifest")]
pub struct ReleaseManifest {
    #[schema(value_type = String, example = "0.0.2")]
    pub version: Version,
    pub build: String,
    pub release_date: String,
    pub download_url: String,
    pub size: u64,
    pub sha256: String,
    pub changelog: Vec<String>,
    pub required: bool,
}

/// Loosely typed view of a manifest document, before validation.
///
/// Every field is kept as a raw JSON value so validation can report
/// exactly which field is wrong instead of a generic serde message.
#[derive(Debug, Default, Deserialize)]
pub struct RawManifest {
    version: Option<Value>,
    build: Option<Value>,
    #[serde(alias = "releaseDate")]
    release_date: Option<Value>,
    #[serde(alias = "downloadUrl")]
    download_url: Option<Value>,
    size: Option<Value>,
    sha256: Option<Value>,
    changelog: Option<Value>,
    required: Option<Value>,
}

fn required_str(
    value: Option<Value>,
    field: &'static str,
) -> std::result::Result<String, ManifestError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ManifestError::field(
            field,
            format!("expected a string, got {}", other),
        )),
        None => Err(ManifestError::field(field, "missing")),
    }
}

fn is_timestamp(s: &str) -> bool {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ];

    DateTime::parse_from_rfc3339(s).is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TryFrom<RawManifest> for ReleaseManifest {
    type Error = ManifestError;

    fn try_from(raw: RawManifest) -> std::result::Result<Self, Self::Error> {
        let version_str = required_str(raw.version, "version")?;
        let version = Version::parse(&version_str)
            .map_err(|e| ManifestError::field("version", e.to_string()))?;

        let build = required_str(raw.build, "build")?;

        let release_date = required_str(raw.release_date, "release_date")?;
        if !is_timestamp(&release_date) {
            return Err(ManifestError::field(
                "release_date",
                format!("not a recognised timestamp: {:?}", release_date),
            ));
        }

        let download_url = required_str(raw.download_url, "download_url")?;
        if download_url.trim().is_empty() {
            return Err(ManifestError::field("download_url", "empty"));
        }

        let size = match raw.size {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                ManifestError::field("size", format!("expected a non-negative integer, got {}", n))
            })?,
            Some(other) => {
                return Err(ManifestError::field(
                    "size",
                    format!("expected a non-negative integer, got {}", other),
                ))
            }
            None => return Err(ManifestError::field("size", "missing")),
        };

        let sha256 = required_str(raw.sha256, "sha256")?;
        if !is_sha256_hex(&sha256) {
            return Err(ManifestError::field(
                "sha256",
                "expected 64 lowercase hex characters",
            ));
        }

        let changelog = match raw.changelog {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(ManifestError::field(
                        "changelog",
                        format!("expected string entries, got {}", other),
                    )),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ManifestError::field(
                    "changelog",
                    format!("expected an array, got {}", other),
                ))
            }
        };

        let required = match raw.required {
            None => false,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(ManifestError::field(
                    "required",
                    format!("expected a boolean, got {}", other),
                ))
            }
        };

        Ok(Self {
            version,
            build,
            release_date,
            download_url,
            size,
            sha256,
            changelog,
            required,
        })
    }
}

impl ReleaseManifest {
    pub fn from_value(value: Value) -> std::result::Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_value(value)?;
        Self::try_from(raw)
    }

    pub fn from_json_str(content: &str) -> std::result::Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(content)?;
        Self::try_from(raw)
    }

    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content).map_err(|source| DepotError::MalformedManifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the manifest as pretty JSON (atomic)
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Write a JSON document to a temp file next to `path`, then rename over it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
