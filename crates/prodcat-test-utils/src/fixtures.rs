//! Pre-built catalog fixtures for common test scenarios.

use serde_yaml::Mapping;

use prodcat_core::store::RecordData;

/// `sat` entry with an active 1.0.0 and an inactive 2.0.0.
pub const SAT_ENTRY: &str = "\
1.0.0:
  active: true
  component_versions:
    docker:
    - name: cray/sat
      version: 3.3.0
2.0.0:
  active: false
  component_versions:
    docker:
    - name: cray/sat
      version: 3.4.0
";

/// `cos` entry with a single version and no active flag.
pub const COS_ENTRY: &str = "\
2.1.0:
  configuration:
    clone_url: https://vcs.example.com/vcs/cray/cos-config-management.git
    commit: 4f1d7e2
    import_branch: cray/cos/2.1.0
";

/// A catalog record holding `sat` and `cos`.
#[must_use]
pub fn catalog_fixture() -> RecordData {
    RecordData::from([
        ("sat".to_string(), SAT_ENTRY.to_string()),
        ("cos".to_string(), COS_ENTRY.to_string()),
    ])
}

/// Parses a YAML mapping literal.
#[must_use]
pub fn fragment(text: &str) -> Mapping {
    serde_yaml::from_str::<Option<Mapping>>(text)
        .expect("valid YAML mapping")
        .unwrap_or_default()
}

/// Parses a product entry into a mapping for comparison.
#[must_use]
pub fn entry_mapping(data: &RecordData, product: &str) -> Mapping {
    let raw = data
        .get(product)
        .unwrap_or_else(|| panic!("no {product} entry in record"));
    fragment(raw)
}
