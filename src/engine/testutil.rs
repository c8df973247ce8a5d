//! Temporary releases tree for tests. Also compiled into the integration
//! tests through `tests/common`, so it only names `crate::engine` paths.

use std::fs;
use std::path::Path;

use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::engine::config::ReleaseLayout;
use crate::engine::manifest::ReleaseManifest;
use crate::engine::version::Version;

pub fn manifest_for(version: &str, payload: &[u8]) -> ReleaseManifest {
    ReleaseManifest {
        version: Version::parse(version).unwrap(),
        build: format!("build-{}", version),
        release_date: "2025-01-14T12:00:00".to_string(),
        download_url: format!("/api/updates/download/{}", version),
        size: payload.len() as u64,
        sha256: hex::encode(Sha256::digest(payload)),
        changelog: vec![format!("Release {}", version)],
        required: false,
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub layout: ReleaseLayout,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = ReleaseLayout::with_root(dir.path());
        Self { dir, layout }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn add_release(&self, version: &str, payload: &[u8]) -> ReleaseManifest {
        self.add_release_with(version, payload, |_| {})
    }

    /// Write an artifact plus a manifest that `edit` may falsify
    pub fn add_release_with(
        &self,
        version: &str,
        payload: &[u8],
        edit: impl FnOnce(&mut ReleaseManifest),
    ) -> ReleaseManifest {
        let mut manifest = manifest_for(version, payload);
        edit(&mut manifest);
        fs::create_dir_all(self.layout.version_dir(version)).unwrap();
        fs::write(self.layout.artifact_path(version), payload).unwrap();
        manifest.save(&self.layout.manifest_path(version)).unwrap();
        manifest
    }

    pub fn write_manifest_raw(&self, dir_name: &str, content: &str) {
        fs::create_dir_all(self.layout.version_dir(dir_name)).unwrap();
        fs::write(self.layout.manifest_path(dir_name), content).unwrap();
    }

    /// Point latest.json at a version, duplicating its manifest like the publisher does
    pub fn set_latest(&self, version: &str) {
        let content = fs::read_to_string(self.layout.manifest_path(version))
            .unwrap_or_else(|_| json!({ "version": version }).to_string());
        fs::write(self.layout.latest_path(), content).unwrap();
    }

    pub fn add_installer(&self, file_name: &str, payload: &[u8]) {
        fs::write(self.root().join(file_name), payload).unwrap();
    }
}
