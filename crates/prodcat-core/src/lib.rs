//! # prodcat-core
//!
//! Core abstractions for maintaining the shared product catalog.
//!
//! - **Documents**: untyped nested values and their kind classification
//! - **Merge Engine**: pure structural merge of a fragment into existing data
//! - **Record Store**: compare-and-swap contract for the shared catalog record
//! - **Error Types**: shared error definitions and result types
//!
//! ## Example
//!
//! ```rust
//! use prodcat_core::merge::merge;
//!
//! let input = serde_yaml::from_str("{docker: [{name: cray-pear}]}").unwrap();
//! let existing = serde_yaml::from_str("{docker: [{name: cray-apple}]}").unwrap();
//!
//! let merged = merge(&input, &existing).unwrap();
//! assert_eq!(merged["docker"].as_sequence().unwrap().len(), 2);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod document;
pub mod error;
pub mod merge;
pub mod observability;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::document::{Document, ValueKind};
    pub use crate::error::{Error, Result};
    pub use crate::merge::{merge, merge_mappings, shallow_overwrite};
    pub use crate::store::{
        MemoryRecordStore, RecordData, RecordKey, RecordStore, VersionedRecord, WriteResult,
    };
}

pub use document::{Document, ValueKind};
pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging, reconcile_span};
pub use store::{
    MemoryRecordStore, RecordData, RecordKey, RecordStore, VersionedRecord, WriteResult,
};
