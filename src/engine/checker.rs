//! Release Integrity Checker
//!
//! Offline tooling over the releases tree: re-hash every artifact and
//! compare it with its manifest, and repair a manifest's size/sha256 from
//! the artifact when an operator asks for it.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::config::ReleaseLayout;
use super::error::{DepotError, Result};
use super::manifest::{write_json_atomic, ManifestError, ReleaseManifest};
use super::verify::{IntegrityVerifier, Measurement, Verdict};
use super::version::Version;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseStatus {
    Verified { verdict: Verdict },
    MissingArtifact,
    UnreadableManifest { reason: String },
}

/// Check result for one version directory
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseCheck {
    /// Directory name
    pub version: String,
    pub manifest_path: PathBuf,
    pub artifact_path: PathBuf,
    pub manifest: Option<ReleaseManifest>,
    pub measured: Option<Measurement>,
    pub status: ReleaseStatus,
}

impl ReleaseCheck {
    pub fn is_ok(&self) -> bool {
        matches!(&self.status, ReleaseStatus::Verified { verdict } if verdict.is_match())
    }
}

/// State of the latest pointer file
#[derive(Debug, Clone, Serialize)]
pub struct PointerCheck {
    pub path: PathBuf,
    pub version: Option<String>,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub root: PathBuf,
    pub releases: Vec<ReleaseCheck>,
    pub pointer: PointerCheck,
}

impl CheckReport {
    /// True when there is at least one release and nothing is wrong
    pub fn is_ok(&self) -> bool {
        !self.releases.is_empty()
            && self.releases.iter().all(ReleaseCheck::is_ok)
            && self.pointer.problems.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.releases.iter().filter(|r| !r.is_ok()).count()
    }
}

/// Outcome of repairing one manifest
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub version: String,
    pub manifest_path: PathBuf,
    pub old_size: Option<u64>,
    pub new_size: u64,
    pub old_sha256: Option<String>,
    pub new_sha256: String,
    pub pointer_updated: bool,
}

pub struct IntegrityChecker {
    layout: ReleaseLayout,
}

fn read_object(path: &std::path::Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| DepotError::MalformedManifest {
        path: path.to_path_buf(),
        source: ManifestError::Syntax(e),
    })
}

impl IntegrityChecker {
    pub fn new(layout: ReleaseLayout) -> Self {
        Self { layout }
    }

    /// Version directories that carry a manifest, oldest first
    fn version_dirs(&self) -> Result<Vec<String>> {
        if !self.layout.root.is_dir() {
            return Err(DepotError::NotFound(format!(
                "releases directory {}",
                self.layout.root.display()
            )));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.layout.root)? {
            let path = entry?.path();
            if !path.is_dir() || !path.join(&self.layout.manifest_file).is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }

        names.sort_by(|a, b| {
            Version::parse_or_zero(a)
                .cmp(&Version::parse_or_zero(b))
                .then_with(|| a.cmp(b))
        });
        Ok(names)
    }

    fn check_release(&self, name: &str) -> ReleaseCheck {
        let manifest_path = self.layout.manifest_path(name);
        let artifact_path = self.layout.artifact_path(name);
        let mut check = ReleaseCheck {
            version: name.to_string(),
            manifest_path: manifest_path.clone(),
            artifact_path: artifact_path.clone(),
            manifest: None,
            measured: None,
            status: ReleaseStatus::MissingArtifact,
        };

        if !artifact_path.is_file() {
            return check;
        }

        let manifest = match ReleaseManifest::load(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                check.status = ReleaseStatus::UnreadableManifest { reason: e.to_string() };
                return check;
            }
        };

        match IntegrityVerifier::measure(&artifact_path) {
            Ok(measured) => {
                let verdict =
                    IntegrityVerifier::compare(manifest.size, &manifest.sha256, &measured);
                check.measured = Some(measured);
                check.status = ReleaseStatus::Verified { verdict };
            }
            Err(e) => {
                check.status = ReleaseStatus::UnreadableManifest {
                    reason: format!("cannot read artifact: {}", e),
                };
            }
        }
        check.manifest = Some(manifest);
        check
    }

    fn check_pointer(&self, releases: &[ReleaseCheck]) -> PointerCheck {
        let path = self.layout.latest_path();
        let mut pointer = PointerCheck {
            path: path.clone(),
            version: None,
            problems: Vec::new(),
        };

        if !path.is_file() {
            pointer.problems.push(format!("{} not found", self.layout.latest_file));
            return pointer;
        }

        let document = match read_object(&path) {
            Ok(document) => document,
            Err(e) => {
                pointer.problems.push(e.to_string());
                return pointer;
            }
        };

        let Some(raw_version) = document.get("version").and_then(Value::as_str) else {
            pointer.problems.push("pointer has no version".to_string());
            return pointer;
        };
        pointer.version = Some(raw_version.to_string());

        if !self.layout.version_dir(raw_version).is_dir() {
            pointer
                .problems
                .push(format!("directory {}/ not found", raw_version));
            return pointer;
        }

        let target = releases
            .iter()
            .find(|r| r.version == raw_version)
            .and_then(|r| r.manifest.as_ref());
        if let Some(target) = target {
            for (key, expected) in [
                ("size", Value::from(target.size)),
                ("sha256", Value::from(target.sha256.clone())),
            ] {
                if let Some(actual) = document.get(key) {
                    if actual != &expected {
                        pointer.problems.push(format!(
                            "{} `{}` is {} but {} declares {}",
                            self.layout.latest_file,
                            key,
                            actual,
                            self.layout.manifest_file,
                            expected
                        ));
                    }
                }
            }
        }

        pointer
    }

    /// Verify every release and the latest pointer
    pub fn check_all(&self) -> Result<CheckReport> {
        let releases: Vec<ReleaseCheck> = self
            .version_dirs()?
            .iter()
            .map(|name| self.check_release(name))
            .collect();
        let pointer = self.check_pointer(&releases);

        Ok(CheckReport {
            root: self.layout.root.clone(),
            releases,
            pointer,
        })
    }

    /// Recompute size/sha256 for one release and write them into its manifest.
    ///
    /// Other manifest keys are left untouched. When the latest pointer names
    /// this version and carries its own size/sha256 copy, that copy is
    /// rewritten as well.
    pub fn fix(&self, version: &str) -> Result<FixOutcome> {
        let target = Version::parse(version)?;
        let manifest_path = self.layout.manifest_path(version);
        let artifact_path = self.layout.artifact_path(version);

        if !artifact_path.is_file() {
            return Err(DepotError::NotFound(format!("{} not found", artifact_path.display())));
        }
        if !manifest_path.is_file() {
            return Err(DepotError::NotFound(format!("{} not found", manifest_path.display())));
        }

        let mut document = read_object(&manifest_path)?;
        let measured = IntegrityVerifier::measure(&artifact_path)?;

        let old_size = document.get("size").and_then(Value::as_u64);
        let old_sha256 = document
            .get("sha256")
            .and_then(Value::as_str)
            .map(str::to_string);

        document.insert("size".to_string(), Value::from(measured.size));
        document.insert("sha256".to_string(), Value::from(measured.sha256.clone()));
        write_json_atomic(&manifest_path, &document)?;
        info!(version, size = measured.size, sha256 = %measured.sha256, "Manifest repaired");

        let pointer_updated = self.fix_pointer(&target, &measured)?;

        Ok(FixOutcome {
            version: version.to_string(),
            manifest_path,
            old_size,
            new_size: measured.size,
            old_sha256,
            new_sha256: measured.sha256,
            pointer_updated,
        })
    }

    fn fix_pointer(&self, target: &Version, measured: &Measurement) -> Result<bool> {
        let path = self.layout.latest_path();
        if !path.is_file() {
            return Ok(false);
        }

        let mut pointer = read_object(&path)?;
        let points_here = pointer
            .get("version")
            .and_then(Value::as_str)
            .and_then(|v| Version::parse(v).ok())
            .is_some_and(|v| &v == target);
        let carries_copy = pointer.contains_key("size") || pointer.contains_key("sha256");
        if !points_here || !carries_copy {
            return Ok(false);
        }

        pointer.insert("size".to_string(), Value::from(measured.size));
        pointer.insert("sha256".to_string(), Value::from(measured.sha256.clone()));
        write_json_atomic(&path, &pointer)?;
        info!(version = %target, "Latest pointer repaired");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::Fixture;

    #[test]
    fn test_clean_tree() {
        let fx = Fixture::new();
        fx.add_release("0.0.1", b"one");
        fx.add_release("0.0.2", b"two");
        fx.set_latest("0.0.2");

        let report = IntegrityChecker::new(fx.layout.clone()).check_all().unwrap();
        assert!(report.is_ok());
        assert_eq!(report.releases.len(), 2);
        assert_eq!(report.pointer.version.as_deref(), Some("0.0.2"));
    }

    #[test]
    fn test_empty_tree_is_not_ok() {
        let fx = Fixture::new();
        let report = IntegrityChecker::new(fx.layout.clone()).check_all().unwrap();
        assert!(!report.is_ok());
        assert!(report.releases.is_empty());
    }

    #[test]
    fn test_reports_size_mismatch() {
        let fx = Fixture::new();
        let payload = vec![1u8; 1_048_576];
        fx.add_release_with("0.0.2", &payload, |m| m.size = 1_048_500);
        fx.set_latest("0.0.2");

        let report = IntegrityChecker::new(fx.layout.clone()).check_all().unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.failed_count(), 1);
        match &report.releases[0].status {
            ReleaseStatus::Verified { verdict } => {
                let size = verdict.size_mismatch().unwrap();
                assert_eq!(size.diff_bytes, 76);
                assert!((size.diff_percent - 0.0073).abs() < 0.0001);
                assert!(verdict.hash_mismatch().is_none());
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_reports_missing_artifact_and_pointer_dir() {
        let fx = Fixture::new();
        fx.add_release("0.0.1", b"one");
        fs::remove_file(fx.layout.artifact_path("0.0.1")).unwrap();
        fx.set_latest("0.0.5");

        let report = IntegrityChecker::new(fx.layout.clone()).check_all().unwrap();
        assert!(matches!(report.releases[0].status, ReleaseStatus::MissingArtifact));
        assert_eq!(report.pointer.problems.len(), 1);
        assert!(report.pointer.problems[0].contains("0.0.5"));
    }

    #[test]
    fn test_releases_sorted_numerically() {
        let fx = Fixture::new();
        for v in ["0.0.10", "0.0.9", "0.1"] {
            fx.add_release(v, v.as_bytes());
        }
        fx.set_latest("0.1");

        let report = IntegrityChecker::new(fx.layout.clone()).check_all().unwrap();
        let order: Vec<&str> = report.releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(order, vec!["0.0.9", "0.0.10", "0.1"]);
    }

    #[test]
    fn test_fix_repairs_manifest_and_pointer() {
        let fx = Fixture::new();
        fx.add_release("0.0.1", b"one");
        fx.add_release_with("0.0.2", b"second build", |m| {
            m.size = 5;
            m.sha256 = "0".repeat(64);
        });
        fx.set_latest("0.0.2");

        let checker = IntegrityChecker::new(fx.layout.clone());
        assert!(!checker.check_all().unwrap().is_ok());

        let outcome = checker.fix("0.0.2").unwrap();
        assert_eq!(outcome.old_size, Some(5));
        assert_eq!(outcome.new_size, 12);
        assert!(outcome.pointer_updated);

        assert!(checker.check_all().unwrap().is_ok());
        let pointer = read_object(&fx.layout.latest_path()).unwrap();
        assert_eq!(pointer["size"], Value::from(12));
        assert_eq!(pointer["sha256"], Value::from(outcome.new_sha256.clone()));

        // Unrelated fields survive
        let repaired = ReleaseManifest::load(&fx.layout.manifest_path("0.0.2")).unwrap();
        assert_eq!(repaired.build, "build-0.0.2");
    }

    #[test]
    fn test_fix_leaves_pointer_for_other_versions() {
        let fx = Fixture::new();
        fx.add_release_with("0.0.1", b"one", |m| m.size = 1);
        fx.add_release("0.0.2", b"two");
        fx.set_latest("0.0.2");
        let before = fs::read_to_string(fx.layout.latest_path()).unwrap();

        let outcome = IntegrityChecker::new(fx.layout.clone()).fix("0.0.1").unwrap();
        assert!(!outcome.pointer_updated);
        assert_eq!(fs::read_to_string(fx.layout.latest_path()).unwrap(), before);
    }

    #[test]
    fn test_fix_missing_release() {
        let fx = Fixture::new();
        let checker = IntegrityChecker::new(fx.layout.clone());
        assert!(matches!(checker.fix("0.0.3"), Err(DepotError::NotFound(_))));
        assert!(matches!(checker.fix("../etc"), Err(DepotError::InvalidVersion(_))));
    }
}
