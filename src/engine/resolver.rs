//! Update Resolver
//!
//! Decides whether a client on `current` should update, and how much of the
//! latest manifest it gets to see.

use std::sync::Arc;

use serde::Serialize;

use super::error::{DepotError, Result};
use super::manifest::ReleaseManifest;
use super::store::{ReleaseIndex, ReleaseStore};
use super::version::Version;

/// Version a client reports when nothing is installed yet
pub const FRESH_INSTALL: &str = "0.0.0";

/// Answer to a "check for updates" query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateDecision {
    pub update_available: bool,
    pub latest_version: String,
    pub current_version: String,
    /// Download metadata; withheld from clients that are already current
    #[serde(flatten)]
    pub payload: Option<ReleaseManifest>,
}

pub struct UpdateResolver {
    store: Arc<ReleaseStore>,
}

impl UpdateResolver {
    pub fn new(store: Arc<ReleaseStore>) -> Self {
        Self { store }
    }

    /// Resolve against the store's current snapshot
    pub fn check(&self, current: &str) -> Result<UpdateDecision> {
        Self::resolve(&self.store.snapshot(), current)
    }

    pub fn resolve(index: &ReleaseIndex, current: &str) -> Result<UpdateDecision> {
        let latest = index.latest().ok_or(DepotError::NoReleasesAvailable)?;
        let current_version = Version::parse(current)?;

        let fresh_install = current_version.is_zero();
        let update_available = latest.manifest.version > current_version || fresh_install;

        Ok(UpdateDecision {
            update_available,
            latest_version: latest.manifest.version.to_string(),
            current_version: current.to_string(),
            payload: update_available.then(|| latest.manifest.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::IndexOptions;
    use crate::engine::testutil::Fixture;
    use serde_json::json;

    fn store(fx: &Fixture) -> Arc<ReleaseStore> {
        Arc::new(ReleaseStore::open(fx.layout.clone(), IndexOptions::default()).unwrap())
    }

    fn two_releases() -> (Fixture, Arc<ReleaseStore>) {
        let fx = Fixture::new();
        fx.add_release("0.0.1", b"first build");
        fx.add_release("0.0.2", b"second build");
        fx.set_latest("0.0.2");
        let store = store(&fx);
        (fx, store)
    }

    #[test]
    fn test_older_client_gets_payload() {
        let (_fx, store) = two_releases();
        let decision = UpdateResolver::new(store.clone()).check("0.0.1").unwrap();

        assert!(decision.update_available);
        assert_eq!(decision.latest_version, "0.0.2");
        assert_eq!(decision.current_version, "0.0.1");
        assert_eq!(decision.payload, Some(store.get_release("0.0.2").unwrap()));
    }

    #[test]
    fn test_current_client_gets_no_metadata() {
        let (_fx, store) = two_releases();
        let decision = UpdateResolver::new(store).check("0.0.2").unwrap();

        assert!(!decision.update_available);
        assert!(decision.payload.is_none());

        let body = serde_json::to_value(&decision).unwrap();
        assert_eq!(
            body,
            json!({
                "update_available": false,
                "latest_version": "0.0.2",
                "current_version": "0.0.2"
            })
        );
    }

    #[test]
    fn test_newer_client_is_current() {
        let (_fx, store) = two_releases();
        let decision = UpdateResolver::new(store).check("0.1").unwrap();
        assert!(!decision.update_available);
        assert!(decision.payload.is_none());
    }

    #[test]
    fn test_fresh_install_gets_payload() {
        let (_fx, store) = two_releases();
        let decision = UpdateResolver::new(store).check(FRESH_INSTALL).unwrap();

        assert!(decision.update_available);
        let body = serde_json::to_value(&decision).unwrap();
        assert_eq!(body["version"], json!("0.0.2"));
        assert_eq!(body["size"], json!(12));
        assert_eq!(body["changelog"], json!(["Release 0.0.2"]));
        assert_eq!(body["required"], json!(false));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (_fx, store) = two_releases();
        let resolver = UpdateResolver::new(store);
        for current in ["0.0.0", "0.0.1", "0.0.2", "3"] {
            assert_eq!(resolver.check(current).unwrap(), resolver.check(current).unwrap());
        }
    }

    #[test]
    fn test_no_latest() {
        let fx = Fixture::new();
        fx.add_release("0.0.1", b"only");
        let resolver = UpdateResolver::new(store(&fx));
        assert!(matches!(resolver.check("0.0.1"), Err(DepotError::NoReleasesAvailable)));
    }

    #[test]
    fn test_malformed_current_version() {
        let (_fx, store) = two_releases();
        let resolver = UpdateResolver::new(store);
        assert!(matches!(resolver.check("latest"), Err(DepotError::InvalidVersion(_))));
    }
}
