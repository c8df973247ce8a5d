//! Depot Configuration Module
//! Handles loading depot.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "depot.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub releases: ReleaseLayout,
    /// Hash every artifact while building the index; mismatching releases are skipped
    #[serde(default)]
    pub verify_on_load: bool,
    /// Rebuild the index periodically (seconds)
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// On-disk layout of the releases tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLayout {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_product")]
    pub product_name: String,
    #[serde(default = "default_artifact_file")]
    pub artifact_file: String,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    #[serde(default = "default_latest_file")]
    pub latest_file: String,
    #[serde(default = "default_installer_prefix")]
    pub installer_prefix: String,
    #[serde(default = "default_installer_suffix")]
    pub installer_suffix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_root() -> PathBuf {
    PathBuf::from("releases")
}

fn default_product() -> String {
    "ManekiTerminal".to_string()
}

fn default_artifact_file() -> String {
    "ManekiTerminal.exe".to_string()
}

fn default_manifest_file() -> String {
    "version.json".to_string()
}

fn default_latest_file() -> String {
    "latest.json".to_string()
}

fn default_installer_prefix() -> String {
    "ManekiTerminal-Setup-".to_string()
}

fn default_installer_suffix() -> String {
    ".exe".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ReleaseLayout {
    fn default() -> Self {
        Self {
            root: default_root(),
            product_name: default_product(),
            artifact_file: default_artifact_file(),
            manifest_file: default_manifest_file(),
            latest_file: default_latest_file(),
            installer_prefix: default_installer_prefix(),
            installer_suffix: default_installer_suffix(),
        }
    }
}

impl ReleaseLayout {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    pub fn manifest_path(&self, version: &str) -> PathBuf {
        self.version_dir(version).join(&self.manifest_file)
    }

    pub fn artifact_path(&self, version: &str) -> PathBuf {
        self.version_dir(version).join(&self.artifact_file)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.root.join(&self.latest_file)
    }

    pub fn installer_file_name(&self, version: &str) -> String {
        format!("{}{}{}", self.installer_prefix, version, self.installer_suffix)
    }

    /// Extract the embedded version string from an installer file name
    pub fn installer_version<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(self.installer_prefix.as_str())?
            .strip_suffix(self.installer_suffix.as_str())
    }

    /// Name clients receive when downloading a release artifact
    pub fn artifact_download_name(&self, version: &str) -> String {
        let extension = Path::new(&self.artifact_file)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        format!("{}-{}{}", self.product_name, version, extension)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load the config if the file exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.releases.manifest_file, "version.json");
        assert!(!config.verify_on_load);
    }

    #[test]
    fn test_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{"server": {"port": 8080}, "releases": {"root": "/srv/releases"}}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.releases.root, PathBuf::from("/srv/releases"));
        assert_eq!(config.releases.latest_file, "latest.json");
    }

    #[test]
    fn test_layout_names() {
        let layout = ReleaseLayout::default();
        assert_eq!(layout.installer_file_name("0.0.2"), "ManekiTerminal-Setup-0.0.2.exe");
        assert_eq!(layout.installer_version("ManekiTerminal-Setup-0.0.2.exe"), Some("0.0.2"));
        assert_eq!(layout.installer_version("Other-0.0.2.exe"), None);
        assert_eq!(layout.artifact_download_name("0.0.2"), "ManekiTerminal-0.0.2.exe");
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::ParseError(_))));
    }
}
