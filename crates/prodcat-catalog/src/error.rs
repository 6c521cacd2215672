//! Error types for prodcat-catalog operations.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Invalid or conflicting configuration. Reported before any store I/O.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The content to merge could not be loaded or parsed.
    #[error("content error: {message}")]
    Content {
        /// Description of the content failure.
        message: String,
    },

    /// Version data does not match the catalog schema.
    #[error("schema validation failed: {message}")]
    Schema {
        /// Description of the first violation found.
        message: String,
    },

    /// The operator-imposed attempt ceiling was reached.
    #[error("catalog update did not converge after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A product, or product version, is not in the catalog.
    #[error("{message}")]
    ProductNotFound {
        /// Description of what was looked up.
        message: String,
    },

    /// The catalog record exists but holds no entries.
    #[error("no data found in {record} catalog record")]
    EmptyCatalog {
        /// The namespace-qualified record name.
        record: String,
    },

    /// An error from prodcat-core (store, serialization, merge conflicts).
    #[error(transparent)]
    Core(#[from] prodcat_core::Error),
}

impl CatalogError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a content error.
    #[must_use]
    pub fn content(message: impl Into<String>) -> Self {
        Self::Content {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by the caller's inputs rather than the
    /// store: these are reported before any I/O and map to a distinct exit
    /// status.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Content { .. } | Self::Schema { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_classification() {
        assert!(CatalogError::configuration("both flags set").is_configuration());
        assert!(CatalogError::content("bad yaml").is_configuration());
        assert!(!CatalogError::RetriesExhausted { attempts: 3 }.is_configuration());
        assert!(!CatalogError::from(prodcat_core::Error::NotFound("x".into())).is_configuration());
    }

    #[test]
    fn core_errors_display_transparently() {
        let err = CatalogError::from(prodcat_core::Error::storage("connection refused"));
        assert_eq!(err.to_string(), "storage error: connection refused");
    }
}
