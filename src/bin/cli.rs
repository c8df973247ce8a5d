//! Depot CLI - offline maintenance of a releases tree
//!
//! This binary provides the `depot` tool: integrity check, manifest repair,
//! listing and an embedded server.

use anyhow::Context;
use clap::Parser;
use depot_lib::engine::{
    api::{run_server, StatusResponse},
    checker::{CheckReport, IntegrityChecker, ReleaseStatus},
    cli::{
        formatter::{format_size, short_hash, verdict_details, CliFormatter},
        Cli, Commands, OutputFormat,
    },
    config::Config,
    store::{IndexOptions, ReleaseStore},
};

fn main() {
    depot_lib::init_tracing();
    let cli = Cli::parse();

    match run_cli(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            CliFormatter::error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

/// Returns false when the command ran but found problems
fn run_cli(cli: Cli) -> anyhow::Result<bool> {
    let json_output = cli.format == OutputFormat::Json;
    let config = cli.load_config().context("loading configuration")?;

    match cli.command {
        Commands::Check => cmd_check(&config, json_output),
        Commands::Fix { version } => {
            cmd_fix(&config, &version, json_output)?;
            Ok(true)
        }
        Commands::List => {
            cmd_list(&config, json_output)?;
            Ok(true)
        }
        Commands::Status => {
            cmd_status(&config, json_output)?;
            Ok(true)
        }
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(config)?;
            Ok(true)
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<ReleaseStore> {
    let options = IndexOptions {
        verify_on_load: config.verify_on_load,
    };
    ReleaseStore::open(config.releases.clone(), options)
        .with_context(|| format!("opening releases at {}", config.releases.root.display()))
}

fn cmd_check(config: &Config, json: bool) -> anyhow::Result<bool> {
    let report = IntegrityChecker::new(config.releases.clone()).check_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check_report(&report);
    }

    Ok(report.is_ok())
}

fn print_check_report(report: &CheckReport) {
    CliFormatter::header(&format!("Checking {}", report.root.display()));

    if report.releases.is_empty() {
        CliFormatter::warning("No version directories with a manifest found");
    }

    for release in &report.releases {
        match &release.status {
            ReleaseStatus::Verified { verdict } if verdict.is_match() => {
                let size = release.measured.as_ref().map(|m| m.size).unwrap_or_default();
                CliFormatter::success(&format!("{} ({})", release.version, format_size(size)));
            }
            ReleaseStatus::Verified { verdict } => {
                CliFormatter::error(&format!(
                    "{}: manifest does not match artifact",
                    release.version
                ));
                for line in verdict_details(verdict) {
                    CliFormatter::item(&line);
                }
                CliFormatter::item(&format!("repair with: depot fix {}", release.version));
            }
            ReleaseStatus::MissingArtifact => {
                CliFormatter::error(&format!(
                    "{}: artifact missing ({})",
                    release.version,
                    release.artifact_path.display()
                ));
            }
            ReleaseStatus::UnreadableManifest { reason } => {
                CliFormatter::error(&format!(
                    "{}: unreadable manifest: {}",
                    release.version, reason
                ));
            }
        }
    }

    CliFormatter::header("Latest pointer");
    match &report.pointer.version {
        Some(version) => CliFormatter::kv("version", version),
        None => CliFormatter::kv("version", "(none)"),
    }
    for problem in &report.pointer.problems {
        CliFormatter::warning(problem);
    }

    CliFormatter::blank();
    let failed = report.failed_count();
    if report.is_ok() {
        CliFormatter::success(&format!("All {} releases verified", report.releases.len()));
    } else if failed > 0 {
        CliFormatter::error(&format!("{} of {} releases failed", failed, report.releases.len()));
    } else {
        CliFormatter::error("Release tree has problems");
    }
}

fn cmd_fix(config: &Config, version: &str, json: bool) -> anyhow::Result<()> {
    let outcome = IntegrityChecker::new(config.releases.clone()).fix(version)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    CliFormatter::success(&format!("Updated {}", outcome.manifest_path.display()));
    let old_size = outcome
        .old_size
        .map(|s| s.to_string())
        .unwrap_or_else(|| "(none)".to_string());
    CliFormatter::kv("size", &format!("{} -> {}", old_size, outcome.new_size));
    CliFormatter::kv(
        "sha256",
        &format!(
            "{} -> {}",
            outcome.old_sha256.as_deref().map(short_hash).unwrap_or("(none)"),
            short_hash(&outcome.new_sha256)
        ),
    );
    if outcome.pointer_updated {
        CliFormatter::info("Latest pointer updated as well");
    }
    Ok(())
}

fn cmd_list(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let releases = store.list_versions();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "versions": releases,
                "count": releases.len(),
            }))?
        );
        return Ok(());
    }

    if releases.is_empty() {
        CliFormatter::warning("No releases available");
        return Ok(());
    }

    let latest = store.snapshot().latest().map(|e| e.manifest.version.clone());
    CliFormatter::header(&format!("{} releases", config.releases.product_name));
    CliFormatter::table_header(&["Version", "Date", "Size", "Flags"]);
    for manifest in &releases {
        let mut flags = Vec::new();
        if latest.as_ref() == Some(&manifest.version) {
            flags.push("latest");
        }
        if manifest.required {
            flags.push("required");
        }
        let version = manifest.version.to_string();
        let size = format_size(manifest.size);
        let flags = flags.join(",");
        CliFormatter::table_row(&[&version, &manifest.release_date, &size, &flags]);
    }
    Ok(())
}

fn cmd_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let index = store.snapshot();
    let status = StatusResponse::from(index.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        CliFormatter::header("Depot Status");
        CliFormatter::kv("Root", &config.releases.root.display().to_string());
        CliFormatter::kv("Releases", &status.releases.to_string());
        CliFormatter::kv("Latest", status.latest.as_deref().unwrap_or("(none)"));
        CliFormatter::kv(
            "Installer",
            index
                .latest_installer()
                .map(|i| i.file_name.as_str())
                .unwrap_or("(none)"),
        );
        if status.issues.is_empty() {
            CliFormatter::success("No issues");
        } else {
            CliFormatter::header(&format!("{} issues", status.issues.len()));
            for issue in &status.issues {
                CliFormatter::warning(&format!("{}: {}", issue.path.display(), issue.message));
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    run_server(config).await
}
