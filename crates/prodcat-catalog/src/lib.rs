//! # prodcat-catalog
//!
//! Maintains the shared product catalog record.
//!
//! Many independent installers write into one catalog record, each owning a
//! single product version subtree. This crate provides:
//!
//! - **Reconciler**: the optimistic-concurrency read/merge/write loop that
//!   folds one version's data into the record without locks
//! - **Product Documents**: decoding, encoding and active-flag handling of a
//!   product's entry
//! - **Query**: typed, read-only access to installed product versions
//! - **ConfigMap Store**: the Kubernetes-backed record store
//!
//! ## Record Layout
//!
//! ```text
//! ConfigMap services/cray-product-catalog
//! └── data
//!     ├── sat: |            # one YAML document per product
//!     │     2.0.0:
//!     │       component_versions: ...
//!     │       active: true
//!     └── cos: |
//!           ...
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use prodcat_catalog::{ProductTarget, ReconcileOptions, Reconciler};
//! use prodcat_core::RecordKey;
//!
//! let target = ProductTarget::new(RecordKey::default(), "sat", "2.0.0")?;
//! let fragment = prodcat_catalog::content::parse_fragment("images: {sat-image: {id: abc}}")?;
//!
//! let outcome = Reconciler::new(store)
//!     .reconcile(&target, &fragment, ReconcileOptions::default())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod content;
pub mod error;
pub mod kube;
pub mod product;
pub mod query;
pub mod reconciler;
pub mod schema;
pub mod version;

pub use config::{
    ActiveMode, ContentSource, ProductTarget, ReconcileOptions, UpdateConfig, WriteMode,
};
pub use error::{CatalogError, Result};
pub use kube::{ConfigMapStore, KubeConfig, RetryPolicy};
pub use product::ProductDocument;
pub use query::{ImsResource, InstalledProductVersion, ProductCatalog};
pub use reconciler::{NoDelay, Pacing, RandomJitter, ReconcileOutcome, Reconciler};
pub use version::compare_versions;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ContentSource, ProductTarget, ReconcileOptions, UpdateConfig};
    pub use crate::error::{CatalogError, Result};
    pub use crate::query::{InstalledProductVersion, ProductCatalog};
    pub use crate::reconciler::{ReconcileOutcome, Reconciler};
}

/// Runs a complete catalog update: loads and optionally validates the
/// fragment, then reconciles it into the record.
///
/// # Errors
///
/// Returns configuration, content and schema errors before touching the
/// store, then any error from [`Reconciler::reconcile`].
pub async fn run_update<S: prodcat_core::RecordStore>(
    reconciler: &Reconciler<S>,
    config: &UpdateConfig,
) -> Result<ReconcileOutcome> {
    config.options.active_mode()?;
    let fragment = content::load_fragment(&config.content)?;
    if config.validate_schema {
        schema::validate(&fragment)?;
        tracing::info!("content validated against the catalog schema");
    }
    reconciler
        .reconcile(&config.target, &fragment, config.options)
        .await
}
