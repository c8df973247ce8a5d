//! Release Store
//!
//! Discovers releases under the configured root and keeps them in an
//! immutable [`ReleaseIndex`] snapshot. Readers clone the snapshot `Arc`
//! and never hold a lock while touching the filesystem; a refresh builds a
//! complete new index and swaps it in only when the build succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::config::ReleaseLayout;
use super::error::{DepotError, Result};
use super::manifest::{ManifestError, ReleaseManifest};
use super::verify::IntegrityVerifier;
use super::version::Version;

/// Knobs for [`build_index`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Hash every artifact and skip releases whose manifest is stale
    pub verify_on_load: bool,
}

/// A release that passed discovery and validation
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseEntry {
    pub manifest: ReleaseManifest,
    pub dir: PathBuf,
    pub artifact: PathBuf,
}

/// An installer found in the root by file name
#[derive(Debug, Clone, Serialize)]
pub struct InstallerEntry {
    pub version: Version,
    /// Version text exactly as embedded in the file name
    pub version_label: String,
    /// False when the embedded version did not parse (ranked as 0.0.0)
    pub well_formed: bool,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingManifest,
    MissingArtifact,
    MalformedManifest,
    Unreadable,
    DirectoryMismatch,
    DuplicateVersion,
    IntegrityMismatch,
    LatestUnavailable,
    LatestNotNewest,
    LatestDiverges,
}

/// A problem found during the scan that did not abort it
#[derive(Debug, Clone, Serialize)]
pub struct ScanIssue {
    pub kind: IssueKind,
    pub path: PathBuf,
    pub message: String,
}

impl ScanIssue {
    fn new(kind: IssueKind, path: &Path, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Changelog view of a release
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChangelogView {
    pub version: String,
    pub changelog: Vec<String>,
    pub release_date: String,
}

/// Immutable snapshot of the releases tree
#[derive(Debug)]
pub struct ReleaseIndex {
    releases: BTreeMap<Version, ReleaseEntry>,
    latest: Option<Version>,
    installers: Vec<InstallerEntry>,
    issues: Vec<ScanIssue>,
    built_at: DateTime<Utc>,
}

impl ReleaseIndex {
    pub fn latest(&self) -> Option<&ReleaseEntry> {
        self.latest.as_ref().and_then(|v| self.releases.get(v))
    }

    pub fn get(&self, version: &Version) -> Option<&ReleaseEntry> {
        self.releases.get(version)
    }

    /// Releases, newest first
    pub fn releases_desc(&self) -> impl Iterator<Item = &ReleaseEntry> {
        self.releases.values().rev()
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Installers, highest embedded version first
    pub fn installers(&self) -> &[InstallerEntry] {
        &self.installers
    }

    pub fn latest_installer(&self) -> Option<&InstallerEntry> {
        self.installers.first()
    }

    /// Installer whose file name carries exactly this (well-formed) version
    pub fn installer(&self, version: &Version) -> Option<&InstallerEntry> {
        self.installers
            .iter()
            .find(|i| i.well_formed && &i.version == version)
    }

    pub fn issues(&self) -> &[ScanIssue] {
        &self.issues
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn load_issue(err: &DepotError, manifest_path: &Path) -> ScanIssue {
    let kind = match err {
        DepotError::MalformedManifest { .. } => IssueKind::MalformedManifest,
        _ => IssueKind::Unreadable,
    };
    ScanIssue::new(kind, manifest_path, err.to_string())
}

/// Validate one version directory; `Err` carries the reason it was skipped.
fn load_release(
    layout: &ReleaseLayout,
    options: &IndexOptions,
    dir: &Path,
    dir_name: &str,
) -> std::result::Result<ReleaseEntry, ScanIssue> {
    let manifest_path = dir.join(&layout.manifest_file);
    let artifact = dir.join(&layout.artifact_file);

    if !manifest_path.is_file() {
        return Err(ScanIssue::new(
            IssueKind::MissingManifest,
            dir,
            format!("no {} in release directory", layout.manifest_file),
        ));
    }
    if !artifact.is_file() {
        return Err(ScanIssue::new(
            IssueKind::MissingArtifact,
            &artifact,
            format!("artifact {} not found", layout.artifact_file),
        ));
    }

    let manifest =
        ReleaseManifest::load(&manifest_path).map_err(|e| load_issue(&e, &manifest_path))?;

    match Version::parse(dir_name) {
        Ok(dir_version) if dir_version == manifest.version => {}
        _ => {
            return Err(ScanIssue::new(
                IssueKind::DirectoryMismatch,
                &manifest_path,
                format!(
                    "manifest version {} does not match directory {:?}",
                    manifest.version, dir_name
                ),
            ))
        }
    }

    if options.verify_on_load {
        let verdict = IntegrityVerifier::verify_manifest(&manifest, &artifact)
            .map_err(|e| ScanIssue::new(IssueKind::Unreadable, &artifact, e.to_string()))?;
        if !verdict.is_match() {
            let err = DepotError::IntegrityMismatch {
                version: manifest.version.to_string(),
                verdict,
            };
            return Err(ScanIssue::new(IssueKind::IntegrityMismatch, &artifact, err.to_string()));
        }
    }

    Ok(ReleaseEntry {
        manifest,
        dir: dir.to_path_buf(),
        artifact,
    })
}

/// `None` when the file is not named like an installer
fn installer_entry(
    layout: &ReleaseLayout,
    path: &Path,
    file_name: &str,
) -> Option<std::result::Result<InstallerEntry, ScanIssue>> {
    let label = layout.installer_version(file_name)?;
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) => return Some(Err(ScanIssue::new(IssueKind::Unreadable, path, e.to_string()))),
    };
    Some(Ok(InstallerEntry {
        well_formed: Version::parse(label).is_ok(),
        version: Version::parse_or_zero(label),
        version_label: label.to_string(),
        file_name: file_name.to_string(),
        path: path.to_path_buf(),
        size,
    }))
}

/// Read the latest pointer: the raw document, its version text and the parsed version
fn read_pointer(path: &Path) -> Result<(Value, String, Version)> {
    let malformed = |source: ManifestError| DepotError::MalformedManifest {
        path: path.to_path_buf(),
        source,
    };

    let content = fs::read_to_string(path)?;
    let document: Value =
        serde_json::from_str(&content).map_err(|e| malformed(ManifestError::Syntax(e)))?;
    let raw_version = document
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            malformed(ManifestError::Field {
                field: "version",
                reason: "missing or not a string".to_string(),
            })
        })?;
    let version = Version::parse(&raw_version).map_err(|e| {
        malformed(ManifestError::Field {
            field: "version",
            reason: e.to_string(),
        })
    })?;

    Ok((document, raw_version, version))
}

/// Resolve the latest pointer against the discovered releases.
///
/// Only the pointer's `version` is authoritative; the served manifest is
/// always the per-version one. An unreadable pointer leaves the index
/// without a latest release; only a pointer to a missing directory is fatal.
fn resolve_latest(
    layout: &ReleaseLayout,
    releases: &BTreeMap<Version, ReleaseEntry>,
    release_dirs: &[(String, PathBuf)],
    issues: &mut Vec<ScanIssue>,
) -> Result<Option<Version>> {
    let pointer_path = layout.latest_path();
    if !pointer_path.is_file() {
        issues.push(ScanIssue::new(
            IssueKind::LatestUnavailable,
            &pointer_path,
            format!("{} not found", layout.latest_file),
        ));
        return Ok(None);
    }

    let (document, raw_version, version) = match read_pointer(&pointer_path) {
        Ok(pointer) => pointer,
        Err(e) => {
            issues.push(load_issue(&e, &pointer_path));
            return Ok(None);
        }
    };

    let Some(entry) = releases.get(&version) else {
        let dir_exists = release_dirs
            .iter()
            .any(|(name, _)| Version::parse(name).map(|v| v == version).unwrap_or(false));
        if !dir_exists {
            return Err(DepotError::Consistency(format!(
                "{} points to {} but no such release directory exists",
                layout.latest_file, raw_version
            )));
        }
        issues.push(ScanIssue::new(
            IssueKind::LatestUnavailable,
            &pointer_path,
            format!("latest release {} is not servable (see other issues)", raw_version),
        ));
        return Ok(None);
    };

    if let Some(newest) = releases.keys().next_back() {
        if newest > &version {
            issues.push(ScanIssue::new(
                IssueKind::LatestNotNewest,
                &pointer_path,
                format!("{} points to {} but {} is newer", layout.latest_file, version, newest),
            ));
        }
    }

    // Publishers duplicate the whole manifest into the pointer; flag copies that drifted
    let carries_copy = ["size", "sha256", "download_url", "downloadUrl"]
        .iter()
        .any(|key| document.get(key).is_some());
    if carries_copy {
        let drifted = match ReleaseManifest::from_value(document.clone()) {
            Ok(copy) => copy != entry.manifest,
            Err(_) => true,
        };
        if drifted {
            issues.push(ScanIssue::new(
                IssueKind::LatestDiverges,
                &pointer_path,
                format!(
                    "{} differs from {}; serving the per-version manifest",
                    layout.latest_file,
                    entry.dir.join(&layout.manifest_file).display()
                ),
            ));
        }
    }

    Ok(Some(version))
}

/// Build a complete index from the releases tree.
///
/// Per-release problems, unreadable installers and a malformed latest
/// pointer are recorded as issues. A latest pointer naming a version with
/// no directory fails the build.
pub fn build_index(layout: &ReleaseLayout, options: &IndexOptions) -> Result<ReleaseIndex> {
    if !layout.root.is_dir() {
        return Err(DepotError::NotFound(format!(
            "releases directory {}",
            layout.root.display()
        )));
    }

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(&layout.root)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if is_hidden(&name) {
            continue;
        }
        if path.is_dir() {
            dirs.push((name, path));
        } else if path.is_file() {
            files.push((name, path));
        }
    }
    // read_dir order is platform dependent
    dirs.sort();
    files.sort();

    let mut issues = Vec::new();
    let mut candidates: BTreeMap<Version, Vec<ReleaseEntry>> = BTreeMap::new();
    for (name, path) in &dirs {
        match load_release(layout, options, path, name) {
            Ok(entry) => candidates
                .entry(entry.manifest.version.clone())
                .or_default()
                .push(entry),
            Err(issue) => issues.push(issue),
        }
    }

    let mut releases = BTreeMap::new();
    for (version, mut entries) in candidates {
        if entries.len() == 1 {
            if let Some(entry) = entries.pop() {
                releases.insert(version, entry);
            }
            continue;
        }
        let dirs: Vec<String> = entries.iter().map(|e| e.dir.display().to_string()).collect();
        let err = DepotError::Consistency(format!(
            "version {} is claimed by {} directories: {}",
            version,
            entries.len(),
            dirs.join(", ")
        ));
        issues.push(ScanIssue::new(IssueKind::DuplicateVersion, &layout.root, err.to_string()));
    }

    let mut installers = Vec::new();
    for (name, path) in &files {
        match installer_entry(layout, path, name) {
            Some(Ok(installer)) => installers.push(installer),
            Some(Err(issue)) => issues.push(issue),
            None => {}
        }
    }
    installers.sort_by(|a, b| {
        b.version
            .cmp(&a.version)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });

    let latest = resolve_latest(layout, &releases, &dirs, &mut issues)?;

    for issue in &issues {
        warn!(kind = ?issue.kind, path = %issue.path.display(), "{}", issue.message);
    }
    info!(
        releases = releases.len(),
        installers = installers.len(),
        latest = %latest.as_ref().map(ToString::to_string).unwrap_or_else(|| "none".to_string()),
        issues = issues.len(),
        "Release index built from {}",
        layout.root.display()
    );

    Ok(ReleaseIndex {
        releases,
        latest,
        installers,
        issues,
        built_at: Utc::now(),
    })
}

/// Read-mostly store over the current index snapshot
pub struct ReleaseStore {
    layout: ReleaseLayout,
    options: IndexOptions,
    current: RwLock<Arc<ReleaseIndex>>,
    rebuild: Mutex<()>,
}

impl ReleaseStore {
    /// Build the initial index; fails if the tree is not consistent
    pub fn open(layout: ReleaseLayout, options: IndexOptions) -> Result<Self> {
        let index = build_index(&layout, &options)?;
        Ok(Self {
            layout,
            options,
            current: RwLock::new(Arc::new(index)),
            rebuild: Mutex::new(()),
        })
    }

    pub fn layout(&self) -> &ReleaseLayout {
        &self.layout
    }

    /// Current snapshot; the lock is held only long enough to clone the `Arc`
    pub fn snapshot(&self) -> Arc<ReleaseIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebuild the index and swap it in. On failure the previous snapshot stays live.
    pub fn refresh(&self) -> Result<Arc<ReleaseIndex>> {
        let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Rebuilding release index");

        let index = match build_index(&self.layout, &self.options) {
            Ok(index) => Arc::new(index),
            Err(e) => {
                warn!("Index rebuild failed, keeping previous snapshot: {}", e);
                return Err(e);
            }
        };

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&index);
        Ok(index)
    }

    pub fn get_latest(&self) -> Result<ReleaseManifest> {
        self.snapshot()
            .latest()
            .map(|e| e.manifest.clone())
            .ok_or(DepotError::NoReleasesAvailable)
    }

    /// Exact lookup under version ordering ("1.2" finds "1.2.0")
    pub fn get_release(&self, version: &str) -> Result<ReleaseManifest> {
        Ok(self.entry(version)?.manifest)
    }

    pub fn get_changelog(&self, version: &str) -> Result<ChangelogView> {
        let manifest = self.get_release(version)?;
        Ok(ChangelogView {
            version: manifest.version.to_string(),
            changelog: manifest.changelog,
            release_date: manifest.release_date,
        })
    }

    /// Artifact location for a release; integrity is not re-checked here
    pub fn get_artifact_path(&self, version: &str) -> Result<PathBuf> {
        Ok(self.entry(version)?.artifact)
    }

    /// All servable releases, newest first
    pub fn list_versions(&self) -> Vec<ReleaseManifest> {
        self.snapshot()
            .releases_desc()
            .map(|e| e.manifest.clone())
            .collect()
    }

    pub fn latest_installer(&self) -> Result<InstallerEntry> {
        self.snapshot()
            .latest_installer()
            .cloned()
            .ok_or_else(|| DepotError::NotFound("no installer files available".to_string()))
    }

    pub fn get_latest_installer_path(&self) -> Result<PathBuf> {
        Ok(self.latest_installer()?.path)
    }

    pub fn get_installer_path(&self, version: &str) -> Result<PathBuf> {
        let version = Version::parse(version)?;
        self.snapshot()
            .installer(&version)
            .map(|i| i.path.clone())
            .ok_or_else(|| DepotError::NotFound(format!("installer {} not found", version)))
    }

    fn entry(&self, version: &str) -> Result<ReleaseEntry> {
        let version = Version::parse(version)?;
        self.snapshot()
            .get(&version)
            .cloned()
            .ok_or_else(|| DepotError::NotFound(format!("release {} not found", version)))
    }
}
