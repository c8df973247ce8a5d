//! Depot CLI Module
//! Command-line interface for release tree maintenance

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::config::{Config, ConfigError, CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(version)]
#[command(about = "Release distribution service and offline integrity checker", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./depot.config.json, optional)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Releases root directory, overrides the config file
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify every release manifest against its artifact
    Check,

    /// Rewrite size and sha256 of a release from its artifact
    Fix {
        /// Version directory to repair
        version: String,
    },

    /// List servable releases, newest first
    List,

    /// Show index summary and scan issues
    Status,

    /// Start the update server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },
}

impl Cli {
    /// Load the config and apply `--root`. An explicit `--config` must exist.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(&PathBuf::from(CONFIG_FILE))?,
        };
        if let Some(root) = &self.root {
            config.releases.root = root.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fix_with_globals() {
        let cli = Cli::parse_from([
            "depot", "fix", "0.0.2", "--root", "/srv/releases", "-f", "json",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.root, Some(PathBuf::from("/srv/releases")));
        assert!(matches!(cli.command, Commands::Fix { ref version } if version == "0.0.2"));
    }

    #[test]
    fn test_serve_overrides_are_optional() {
        let cli = Cli::parse_from(["depot", "serve"]);
        assert!(matches!(cli.command, Commands::Serve { port: None, host: None }));
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_root_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"releases": {"root": "/from/config"}}"#).unwrap();

        let cli = Cli::parse_from(["depot", "list", "--config", path.to_str().unwrap()]);
        assert_eq!(cli.load_config().unwrap().releases.root, PathBuf::from("/from/config"));

        let cli = Cli::parse_from([
            "depot", "list", "--config", path.to_str().unwrap(), "--root", "/from/flag",
        ]);
        assert_eq!(cli.load_config().unwrap().releases.root, PathBuf::from("/from/flag"));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let cli = Cli::parse_from(["depot", "check", "--config", "/nonexistent/depot.json"]);
        assert!(matches!(cli.load_config(), Err(ConfigError::NotFound(_))));
    }
}
