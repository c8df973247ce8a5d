//! Depot update server entry point

use anyhow::Context;
use depot_lib::engine::config::{Config, CONFIG_FILE};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    depot_lib::init_tracing();

    let path = std::env::var_os("DEPOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = Config::load_or_default(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    depot_lib::engine::api::run_server(config).await
}
