//! Error types and result aliases for prodcat.
//!
//! Errors are structured for programmatic handling: the reconciler inspects the
//! variant to decide whether an attempt is retried or surfaced to the caller.

use std::fmt;

use crate::document::ValueKind;

/// The result type used throughout prodcat.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in prodcat operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Two values could not be merged because their kinds differ.
    #[error(
        "cannot merge {input} (type {input_kind}) with {existing} (type {existing_kind})"
    )]
    TypeConflict {
        /// Rendered input value.
        input: String,
        /// Kind of the input value.
        input_kind: ValueKind,
        /// Rendered existing value.
        existing: String,
        /// Kind of the existing value.
        existing_kind: ValueKind,
    },

    /// A merge was requested on values that are not mappings.
    #[error("merge inputs must be mappings, got {input_kind} and {existing_kind}")]
    NotMappings {
        /// Kind of the input value.
        input_kind: ValueKind,
        /// Kind of the existing value.
        existing_kind: ValueKind,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Returns true for the "record does not exist" condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for merge kind conflicts.
    #[must_use]
    pub fn is_type_conflict(&self) -> bool {
        matches!(self, Self::TypeConflict { .. } | Self::NotMappings { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn type_conflict_names_both_values() {
        let err = Error::TypeConflict {
            input: "\"undefined\"".into(),
            input_kind: ValueKind::String,
            existing: "30".into(),
            existing_kind: ValueKind::Integer,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("\"undefined\" (type string)"));
        assert!(rendered.contains("30 (type integer)"));
        assert!(err.is_type_conflict());
    }

    #[test]
    fn storage_error_keeps_source() {
        let io = std::io::Error::other("connection reset");
        let err = Error::storage_with_source("read configmap", io);
        assert!(err.source().is_some());
        assert!(!err.is_not_found());
    }
}
