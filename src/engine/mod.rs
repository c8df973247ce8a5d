// Depot Engine - Core module structure
pub mod version;
pub mod manifest;
pub mod verify;
pub mod error;
pub mod config;
pub mod store;
pub mod resolver;
pub mod checker;
pub mod api;
pub mod cli;

#[cfg(test)]
mod testutil;

pub use checker::IntegrityChecker;
pub use config::Config;
pub use error::{DepotError, Result};
pub use manifest::ReleaseManifest;
pub use resolver::UpdateResolver;
pub use store::ReleaseStore;
pub use verify::IntegrityVerifier;
pub use version::Version;
