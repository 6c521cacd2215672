//! Update configuration.
//!
//! Everything an update needs is gathered into an [`UpdateConfig`] once at
//! startup and handed to the reconciler. Validation happens here so that bad
//! inputs fail before the store is touched.

use std::path::PathBuf;

use prodcat_core::store::RecordKey;

use crate::error::{CatalogError, Result};

/// The product version subtree a writer owns within a catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductTarget {
    /// The shared catalog record.
    pub record: RecordKey,
    /// Product name (record entry key).
    pub product: String,
    /// Product version (key within the product entry).
    pub version: String,
}

impl ProductTarget {
    /// Creates a target, trimming surrounding whitespace from the names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the product or version is empty.
    pub fn new(record: RecordKey, product: &str, version: &str) -> Result<Self> {
        let product = product.trim();
        let version = version.trim();
        if product.is_empty() {
            return Err(CatalogError::configuration("product name is required"));
        }
        if version.is_empty() {
            return Err(CatalogError::configuration("product version is required"));
        }
        Ok(Self {
            record,
            product: product.to_string(),
            version: version.to_string(),
        })
    }
}

/// What an update does with the `active` flag of the product's versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveMode {
    /// Leave `active` flags as they are.
    #[default]
    Unchanged,
    /// Mark the target version active and every sibling inactive.
    Set,
    /// Remove the `active` key from every version.
    Clear,
}

/// How the fragment is combined with the version's existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Structural merge (nested mappings merged, sequences appended).
    #[default]
    Merge,
    /// Top-level keys of the fragment replace existing keys wholesale.
    Overwrite,
}

/// Per-update options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOptions {
    /// Mark the target version active.
    pub set_active: bool,
    /// Strip `active` from every version of the product.
    pub clear_active: bool,
    /// Shallow overwrite instead of structural merge.
    pub overwrite: bool,
}

impl ReconcileOptions {
    /// Resolves the active-flag handling.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if both `set_active` and `clear_active`
    /// are requested.
    pub fn active_mode(&self) -> Result<ActiveMode> {
        match (self.set_active, self.clear_active) {
            (true, true) => Err(CatalogError::configuration(
                "set-active and remove-active-field are mutually exclusive",
            )),
            (true, false) => Ok(ActiveMode::Set),
            (false, true) => Ok(ActiveMode::Clear),
            (false, false) => Ok(ActiveMode::Unchanged),
        }
    }

    /// Resolves the write mode.
    #[must_use]
    pub const fn write_mode(&self) -> WriteMode {
        if self.overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::Merge
        }
    }
}

/// Where the fragment to merge comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// A YAML file on disk.
    File(PathBuf),
    /// Inline YAML text.
    Inline(String),
}

impl ContentSource {
    /// Picks the content source from the possible inputs.
    ///
    /// A file wins over inline text; `legacy_file` is accepted in place of
    /// `file` for older callers. Blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no source is given.
    pub fn resolve(
        file: Option<PathBuf>,
        legacy_file: Option<PathBuf>,
        inline: Option<String>,
    ) -> Result<Self> {
        let non_blank_path = |path: Option<PathBuf>| {
            path.filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
        };

        if let Some(path) = non_blank_path(file).or_else(|| non_blank_path(legacy_file)) {
            return Ok(Self::File(path));
        }
        match inline {
            Some(text) if !text.trim().is_empty() => Ok(Self::Inline(text)),
            _ => Err(CatalogError::configuration(
                "one of a YAML content file or a YAML content string must be specified",
            )),
        }
    }
}

/// Fully resolved configuration for one catalog update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    /// Record and product version to update.
    pub target: ProductTarget,
    /// Fragment source.
    pub content: ContentSource,
    /// Active-flag and write-mode options.
    pub options: ReconcileOptions,
    /// Validate the fragment against the catalog schema before any I/O.
    pub validate_schema: bool,
    /// Optional ceiling on reconcile attempts; `None` retries until done.
    pub max_attempts: Option<u32>,
}

impl UpdateConfig {
    /// Builds and validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for conflicting active-flag options.
    pub fn new(
        target: ProductTarget,
        content: ContentSource,
        options: ReconcileOptions,
    ) -> Result<Self> {
        options.active_mode()?;
        Ok(Self {
            target,
            content,
            options,
            validate_schema: false,
            max_attempts: None,
        })
    }

    /// Enables schema validation of the fragment.
    #[must_use]
    pub const fn with_schema_validation(mut self, enabled: bool) -> Self {
        self.validate_schema = enabled;
        self
    }

    /// Sets an attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}
