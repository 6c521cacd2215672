//! Shared test utilities for prodcat integration tests.
//!
//! This crate provides:
//! - [`TracingRecordStore`]: in-memory record store with operation recording
//!   and fault injection
//! - [`FakeKubeApi`]: a local HTTP server speaking the ConfigMap API subset
//!   the catalog uses
//! - Fixtures for catalog records and fragments
//!
//! # Example
//!
//! ```rust,ignore
//! use prodcat_test_utils::{TracingRecordStore, catalog_fixture};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = TracingRecordStore::new();
//!     store.seed(&RecordKey::default(), catalog_fixture());
//!     // ... run reconcile ...
//!     assert_eq!(store.write_count(), 1);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fake_kube;
pub mod fixtures;
pub mod storage;

pub use fake_kube::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("prodcat=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
