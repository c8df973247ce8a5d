mod common;

use common::Fixture;
use depot_lib::engine;
use engine::checker::{IntegrityChecker, ReleaseStatus};
use engine::error::DepotError;
use engine::resolver::UpdateResolver;
use engine::store::{IndexOptions, ReleaseStore};
use engine::verify::Verdict;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_truncated_artifact_is_reported_then_repaired() -> Result<(), Box<dyn std::error::Error>> {
    let tree = Fixture::new();
    let payload = vec![7u8; 1_048_576];
    tree.add_release_with("0.0.2", &payload, |m| m.size = 1_048_500);
    tree.set_latest("0.0.2");

    let checker = IntegrityChecker::new(tree.layout.clone());
    let report = checker.check_all()?;
    assert!(!report.is_ok());
    assert_eq!(report.failed_count(), 1);

    let ReleaseStatus::Verified { verdict } = &report.releases[0].status else {
        panic!("expected a verdict, got {:?}", report.releases[0].status);
    };
    let Verdict::SizeMismatch(size) = verdict else {
        panic!("expected a size mismatch, got {:?}", verdict);
    };
    assert_eq!(size.expected, 1_048_500);
    assert_eq!(size.actual, 1_048_576);
    assert_eq!(size.diff_bytes, 76);
    assert!((size.diff_percent - 0.0073).abs() < 0.0001);

    // latest.json carries the same stale copy
    let outcome = checker.fix("0.0.2")?;
    assert_eq!(outcome.old_size, Some(1_048_500));
    assert_eq!(outcome.new_size, 1_048_576);
    assert!(outcome.pointer_updated);

    let repaired = read_json(&tree.layout.manifest_path("0.0.2"));
    assert_eq!(repaired["size"], 1_048_576);
    assert_eq!(repaired["build"], "build-0.0.2");
    assert_eq!(read_json(&tree.layout.latest_path())["size"], 1_048_576);

    assert!(checker.check_all()?.is_ok());
    Ok(())
}

#[test]
fn test_pointer_to_missing_directory_fails_open() {
    let tree = Fixture::new();
    tree.add_release("0.0.1", b"one");
    tree.set_latest("0.0.5");

    let result = ReleaseStore::open(tree.layout.clone(), IndexOptions::default());
    assert!(matches!(result, Err(DepotError::Consistency(_))));

    let report = IntegrityChecker::new(tree.layout.clone()).check_all().unwrap();
    assert!(!report.is_ok());
    assert!(!report.pointer.problems.is_empty());
}

#[test]
fn test_verify_on_load_hides_stale_release() -> Result<(), Box<dyn std::error::Error>> {
    let tree = Fixture::new();
    tree.add_release("0.0.1", b"good");
    tree.add_release_with("0.0.2", b"original", |m| m.sha256 = "0".repeat(64));
    tree.set_latest("0.0.1");

    let lenient = ReleaseStore::open(tree.layout.clone(), IndexOptions::default())?;
    assert_eq!(lenient.list_versions().len(), 2);

    let strict = ReleaseStore::open(tree.layout.clone(), IndexOptions { verify_on_load: true })?;
    let versions: Vec<String> = strict
        .list_versions()
        .iter()
        .map(|m| m.version.to_string())
        .collect();
    assert_eq!(versions, vec!["0.0.1"]);
    assert!(matches!(strict.get_release("0.0.2"), Err(DepotError::NotFound(_))));
    Ok(())
}

#[test]
fn test_resolver_follows_refresh() -> Result<(), Box<dyn std::error::Error>> {
    let tree = Fixture::new();
    tree.add_release("0.0.1", b"one");
    tree.set_latest("0.0.1");

    let store = Arc::new(ReleaseStore::open(tree.layout.clone(), IndexOptions::default())?);
    let resolver = UpdateResolver::new(Arc::clone(&store));
    assert!(!resolver.check("0.0.1")?.update_available);

    tree.add_release("0.0.2", b"two");
    tree.set_latest("0.0.2");
    store.refresh()?;

    let decision = resolver.check("0.0.1")?;
    assert!(decision.update_available);
    assert_eq!(decision.latest_version, "0.0.2");
    Ok(())
}
