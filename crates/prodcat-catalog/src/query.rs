//! Read-only view of installed product versions.
//!
//! Loads the catalog record once and exposes each product version with typed
//! accessors. Entries that do not fit the schema are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use prodcat_core::ValueKind;
use prodcat_core::document::key_to_string;
use prodcat_core::store::{RecordData, RecordKey, RecordStore};

use crate::error::{CatalogError, Result};
use crate::schema::{
    ConfigurationRepo, ImageResource, NamedArtifact, Repository, RepositoryKind, VersionData,
};
use crate::version::compare_versions;

/// All valid installed product versions in a catalog record.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    record: RecordKey,
    products: Vec<InstalledProductVersion>,
}

impl ProductCatalog {
    /// Reads and decodes the catalog record from a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record is empty.
    pub async fn load<S: RecordStore>(store: &S, record: &RecordKey) -> Result<Self> {
        let snapshot = store.read(record).await?;
        Self::from_record(record.clone(), &snapshot.data)
    }

    /// Decodes catalog record data.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyCatalog`] if there are no entries.
    /// Entries and versions that do not fit the schema are skipped.
    pub fn from_record(record: RecordKey, data: &RecordData) -> Result<Self> {
        if data.is_empty() {
            return Err(CatalogError::EmptyCatalog {
                record: record.to_string(),
            });
        }

        let mut products = Vec::new();
        for (name, raw) in data {
            let versions = match serde_yaml::from_str::<Value>(raw) {
                Ok(Value::Mapping(versions)) => versions,
                Ok(Value::Null) => continue,
                Ok(other) => {
                    tracing::debug!(
                        product = %name,
                        kind = %ValueKind::of(&other),
                        "skipping product entry that is not a mapping"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::debug!(product = %name, error = %e, "skipping unparseable product entry");
                    continue;
                }
            };

            for (key, version_data) in versions {
                let Some(version) = key_to_string(&key) else {
                    tracing::debug!(product = %name, "skipping non-scalar version key");
                    continue;
                };
                let version_data = match version_data {
                    Value::Null => Mapping::new(),
                    Value::Mapping(version_data) => version_data,
                    other => {
                        tracing::debug!(
                            product = %name,
                            %version,
                            kind = %ValueKind::of(&other),
                            "skipping version data that is not a mapping"
                        );
                        continue;
                    }
                };
                match InstalledProductVersion::new(name, &version, version_data) {
                    Ok(product) => products.push(product),
                    Err(e) => {
                        tracing::debug!(
                            product = %name,
                            %version,
                            error = %e,
                            "skipping version data not valid against the catalog schema"
                        );
                    }
                }
            }
        }

        Ok(Self { record, products })
    }

    /// The record this catalog was read from.
    #[must_use]
    pub fn record(&self) -> &RecordKey {
        &self.record
    }

    /// All valid product versions.
    #[must_use]
    pub fn products(&self) -> &[InstalledProductVersion] {
        &self.products
    }

    /// Looks up a product version, or its latest version when `version` is
    /// `None` or blank.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if nothing matches.
    pub fn get_product(&self, name: &str, version: Option<&str>) -> Result<&InstalledProductVersion> {
        match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(version) => self
                .products
                .iter()
                .find(|p| p.name == name && p.version == version)
                .ok_or_else(|| CatalogError::ProductNotFound {
                    message: format!("no installed products with name {name} and version {version}"),
                }),
            None => {
                let latest = self
                    .products
                    .iter()
                    .filter(|p| p.name == name)
                    .max_by(|a, b| compare_versions(&a.version, &b.version))
                    .ok_or_else(|| CatalogError::ProductNotFound {
                        message: format!("no installed products with name {name}"),
                    })?;
                tracing::debug!(product = name, version = %latest.version, "using latest version");
                Ok(latest)
            }
        }
    }
}

/// An image or recipe provided by a product version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImsResource {
    /// Resource name.
    pub name: String,
    /// Identifier in the image management service, if recorded.
    pub id: Option<String>,
}

/// One installed version of a product.
#[derive(Debug, Clone)]
pub struct InstalledProductVersion {
    /// Product name.
    pub name: String,
    /// Product version.
    pub version: String,
    data: Mapping,
    parsed: VersionData,
}

impl InstalledProductVersion {
    /// Creates a product version from its raw data.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the data does not fit the catalog schema.
    pub fn new(name: &str, version: &str, data: Mapping) -> Result<Self> {
        let parsed = VersionData::parse(&data)?;
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            data,
            parsed,
        })
    }

    /// Raw version data as stored.
    #[must_use]
    pub fn data(&self) -> &Mapping {
        &self.data
    }

    /// Container images as (name, version) pairs.
    #[must_use]
    pub fn docker_images(&self) -> Vec<(&str, &str)> {
        self.parsed
            .component_versions
            .as_ref()
            .and_then(|c| c.docker.as_deref())
            .unwrap_or_default()
            .iter()
            .map(|NamedArtifact { name, version }| (name.as_str(), version.as_str()))
            .collect()
    }

    /// Package repositories.
    #[must_use]
    pub fn repositories(&self) -> &[Repository] {
        self.parsed
            .component_versions
            .as_ref()
            .and_then(|c| c.repositories.as_deref())
            .unwrap_or_default()
    }

    fn repositories_of(&self, kind: RepositoryKind) -> impl Iterator<Item = &Repository> {
        self.repositories().iter().filter(move |r| r.kind == kind)
    }

    /// Group repositories.
    #[must_use]
    pub fn group_repositories(&self) -> Vec<&Repository> {
        self.repositories_of(RepositoryKind::Group).collect()
    }

    /// Hosted repositories.
    #[must_use]
    pub fn hosted_repositories(&self) -> Vec<&Repository> {
        self.repositories_of(RepositoryKind::Hosted).collect()
    }

    /// Names of hosted repositories plus every member of a group repository.
    #[must_use]
    pub fn hosted_and_member_repo_names(&self) -> BTreeSet<&str> {
        let hosted = self
            .repositories_of(RepositoryKind::Hosted)
            .map(|r| r.name.as_str());
        let members = self
            .repositories_of(RepositoryKind::Group)
            .flat_map(|r| r.members.as_deref().unwrap_or_default())
            .map(String::as_str);
        hosted.chain(members).collect()
    }

    /// Configuration management repository pointer, if any.
    #[must_use]
    pub fn configuration(&self) -> Option<&ConfigurationRepo> {
        self.parsed.configuration.as_ref()
    }

    /// Clone URL of the configuration repository.
    #[must_use]
    pub fn clone_url(&self) -> Option<&str> {
        self.configuration().and_then(|c| c.clone_url.as_deref())
    }

    /// Commit of the imported configuration content.
    #[must_use]
    pub fn commit(&self) -> Option<&str> {
        self.configuration().and_then(|c| c.commit.as_deref())
    }

    /// Branch the configuration content was imported to.
    #[must_use]
    pub fn import_branch(&self) -> Option<&str> {
        self.configuration().and_then(|c| c.import_branch.as_deref())
    }

    /// Images provided by the product.
    #[must_use]
    pub fn images(&self) -> Vec<ImsResource> {
        ims_resources(self.parsed.images.as_ref())
    }

    /// Recipes provided by the product.
    #[must_use]
    pub fn recipes(&self) -> Vec<ImsResource> {
        ims_resources(self.parsed.recipes.as_ref())
    }

    /// Whether this version records an active flag at all.
    #[must_use]
    pub fn supports_active(&self) -> bool {
        self.parsed.active.is_some()
    }

    /// Whether this is the product's active version.
    #[must_use]
    pub fn active(&self) -> bool {
        self.parsed.active.unwrap_or(false)
    }
}

fn ims_resources(resources: Option<&BTreeMap<String, ImageResource>>) -> Vec<ImsResource> {
    resources
        .into_iter()
        .flatten()
        .map(|(name, resource)| ImsResource {
            name: name.clone(),
            id: resource.id.clone(),
        })
        .collect()
}

impl fmt::Display for InstalledProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAT: &str = r"
2.0.0:
  component_versions:
    docker:
      - {name: cray/sat, version: 3.4.0}
    repositories:
      - {name: sat-sle-15sp2, type: group, members: [sat-2.0.0-sle-15sp2]}
      - {name: sat-2.0.0-sle-15sp2, type: hosted}
      - {name: sat-extra, type: hosted}
  configuration:
    clone_url: https://vcs.example.com/vcs/cray/sat-config-management.git
    commit: 0123abcd
    import_branch: cray/sat/2.0.0
  images:
    sat-image: {id: 8b3a8e6c}
  active: true
2.10.0:
  active: false
1.9.0: {}
";

    fn catalog() -> ProductCatalog {
        let data = RecordData::from([
            ("sat".to_string(), SAT.to_string()),
            ("cos".to_string(), "1.0.0:\n  active: maybe\n".to_string()),
        ]);
        ProductCatalog::from_record(RecordKey::default(), &data).expect("catalog")
    }

    #[test]
    fn empty_record_is_an_error() {
        let err = ProductCatalog::from_record(RecordKey::default(), &RecordData::new())
            .expect_err("empty");
        assert!(matches!(err, CatalogError::EmptyCatalog { .. }));
    }

    #[test]
    fn invalid_versions_are_skipped() {
        let catalog = catalog();
        assert_eq!(catalog.products().len(), 3);
        assert!(catalog.get_product("cos", None).is_err());
    }

    #[test]
    fn malformed_entries_do_not_hide_valid_products() {
        let data = RecordData::from([
            ("sat".to_string(), "2.0.0: {active: true}\n".to_string()),
            ("cos".to_string(), "1.0.0: [not, a, mapping]\n2.0.0: {}\n".to_string()),
            ("csm".to_string(), "- 1.0.0\n".to_string()),
            ("uan".to_string(), "1.0.0: {\n".to_string()),
        ]);
        let catalog = ProductCatalog::from_record(RecordKey::default(), &data).expect("catalog");

        assert_eq!(catalog.products().len(), 2);
        assert!(catalog.get_product("sat", None).expect("sat").active());
        assert_eq!(catalog.get_product("cos", None).expect("cos").version, "2.0.0");
        assert!(catalog.get_product("cos", Some("1.0.0")).is_err());
        assert!(catalog.get_product("csm", None).is_err());
    }

    #[test]
    fn latest_version_by_version_order() {
        let catalog = catalog();
        let latest = catalog.get_product("sat", None).expect("latest");
        assert_eq!(latest.version, "2.10.0");
        assert_eq!(latest.to_string(), "sat-2.10.0");
        assert!(latest.supports_active());
        assert!(!latest.active());
    }

    #[test]
    fn specific_version_lookup() {
        let catalog = catalog();
        assert!(catalog.get_product("sat", Some("3.0.0")).is_err());
        let old = catalog.get_product("sat", Some("1.9.0")).expect("1.9.0");
        assert!(!old.supports_active());
        assert!(old.docker_images().is_empty());
        assert!(old.images().is_empty());
    }

    #[test]
    fn accessors_expose_version_data() {
        let catalog = catalog();
        let sat = catalog.get_product("sat", Some("2.0.0")).expect("2.0.0");

        assert_eq!(sat.docker_images(), vec![("cray/sat", "3.4.0")]);
        assert_eq!(sat.repositories().len(), 3);
        assert_eq!(sat.group_repositories().len(), 1);
        assert_eq!(sat.hosted_repositories().len(), 2);
        assert_eq!(
            sat.hosted_and_member_repo_names(),
            BTreeSet::from(["sat-2.0.0-sle-15sp2", "sat-extra"])
        );
        assert_eq!(sat.commit(), Some("0123abcd"));
        assert_eq!(sat.import_branch(), Some("cray/sat/2.0.0"));
        assert!(sat.clone_url().is_some_and(|u| u.ends_with(".git")));
        assert_eq!(
            sat.images(),
            vec![ImsResource {
                name: "sat-image".into(),
                id: Some("8b3a8e6c".into())
            }]
        );
        assert!(sat.recipes().is_empty());
        assert!(sat.active());
    }
}
