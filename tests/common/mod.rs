//! Release tree fixtures shared with the unit tests.
//!
//! Each test crate brings `depot_lib::engine` into its root so the shared
//! file resolves its `crate::engine` imports.

#[allow(dead_code)]
#[path = "../../src/engine/testutil.rs"]
mod testutil;

pub use testutil::Fixture;
