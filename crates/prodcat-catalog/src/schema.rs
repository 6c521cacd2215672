//! Typed contract for product version data.
//!
//! Version data is stored untyped so that every writer can add fields, but
//! readers and the optional pre-write validation check it against this
//! contract. Unknown keys are allowed at every level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{CatalogError, Result};

/// The known shape of one product version's data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionData {
    /// Versions of components shipped with the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_versions: Option<ComponentVersions>,

    /// Configuration management repository pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationRepo>,

    /// Image resources provided by the product, keyed by image name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<BTreeMap<String, ImageResource>>,

    /// Recipe resources provided by the product, keyed by recipe name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipes: Option<BTreeMap<String, ImageResource>>,

    /// Whether this is the product's active version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    /// Fields outside the contract.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Component versions of a product version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentVersions {
    /// Container images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<Vec<NamedArtifact>>,

    /// Helm charts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<Vec<NamedArtifact>>,

    /// Package repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<Repository>>,

    /// Fields outside the contract.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A named, versioned artifact (container image, chart).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedArtifact {
    /// Artifact name.
    pub name: String,
    /// Artifact version.
    pub version: String,
}

/// Kind of a package repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// A repository aggregating member repositories.
    Group,
    /// A repository hosting its own content.
    Hosted,
    /// A repository proxying a remote.
    Proxy,
}

/// A package repository descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// Repository kind.
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    /// Member repository names (group repositories only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

/// Configuration management repository pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRepo {
    /// Clone URL of the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    /// Commit hash of the imported content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Branch the content was imported to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_branch: Option<String>,
    /// When the content was imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_date: Option<String>,
    /// SSH clone URL of the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_url: Option<String>,
}

/// An image or recipe provided by a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResource {
    /// Identifier of the resource in the image management service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl VersionData {
    /// Parses version data against the contract.
    ///
    /// # Errors
    ///
    /// Returns a schema error describing the first violation.
    pub fn parse(data: &Mapping) -> Result<Self> {
        let parsed: Self = serde_yaml::from_value(Value::Mapping(data.clone()))
            .map_err(|e| CatalogError::Schema {
                message: e.to_string(),
            })?;
        parsed.check_repositories()?;
        Ok(parsed)
    }

    fn check_repositories(&self) -> Result<()> {
        let repositories = self
            .component_versions
            .as_ref()
            .and_then(|c| c.repositories.as_deref())
            .unwrap_or_default();
        for repo in repositories {
            if repo.kind == RepositoryKind::Group && repo.members.is_none() {
                return Err(CatalogError::Schema {
                    message: format!("group repository {} has no members", repo.name),
                });
            }
        }
        Ok(())
    }
}

/// Validates version data against the contract.
///
/// # Errors
///
/// Returns a schema error describing the first violation.
pub fn validate(data: &Mapping) -> Result<()> {
    VersionData::parse(data).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(text: &str) -> Mapping {
        serde_yaml::from_str(text).expect("valid yaml mapping")
    }

    #[test]
    fn accepts_full_version_data() {
        let data = mapping(
            r"
component_versions:
  docker:
    - {name: cray/sat, version: 3.4.0}
  repositories:
    - {name: sat-sle-15sp2, type: group, members: [sat-2.0.0-sle-15sp2]}
    - {name: sat-2.0.0-sle-15sp2, type: hosted}
configuration:
  clone_url: https://vcs.example.com/vcs/cray/sat-config-management.git
  commit: 0123abcd
  import_branch: cray/sat/2.0.0
images:
  sat-image: {id: 8b3a8e6c}
recipes: {}
active: true
custom_field: [1, 2]
",
        );
        let parsed = VersionData::parse(&data).expect("valid");
        assert_eq!(parsed.active, Some(true));
        assert!(parsed.extra.contains_key("custom_field"));
        let repos = parsed
            .component_versions
            .and_then(|c| c.repositories)
            .expect("repositories");
        assert_eq!(repos[0].kind, RepositoryKind::Group);
    }

    #[test]
    fn empty_data_is_valid() {
        validate(&Mapping::new()).expect("empty mapping is valid");
    }

    #[test]
    fn rejects_non_boolean_active() {
        let err = validate(&mapping("active: maybe")).expect_err("invalid");
        assert!(matches!(err, CatalogError::Schema { .. }));
    }

    #[test]
    fn rejects_docker_entry_without_version() {
        assert!(validate(&mapping("component_versions: {docker: [{name: cray/sat}]}")).is_err());
    }

    #[test]
    fn rejects_unknown_repository_kind() {
        assert!(
            validate(&mapping(
                "component_versions: {repositories: [{name: r, type: mirror}]}"
            ))
            .is_err()
        );
    }

    #[test]
    fn rejects_group_without_members() {
        let err = validate(&mapping(
            "component_versions: {repositories: [{name: sat-sle, type: group}]}",
        ))
        .expect_err("group needs members");
        assert!(err.to_string().contains("sat-sle"));
    }
}
