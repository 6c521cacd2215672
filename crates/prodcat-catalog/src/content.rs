//! Loading the fragment to merge.

use serde_yaml::{Mapping, Value};

use crate::config::ContentSource;
use crate::error::{CatalogError, Result};

/// Loads and parses the fragment from its source.
///
/// An empty document loads as an empty mapping.
///
/// # Errors
///
/// Returns a content error if the file cannot be read, the text is not valid
/// YAML, or the document is not a mapping.
pub fn load_fragment(source: &ContentSource) -> Result<Mapping> {
    let text = match source {
        ContentSource::File(path) => {
            tracing::info!(path = %path.display(), "retrieving content from file");
            std::fs::read_to_string(path).map_err(|e| {
                CatalogError::content(format!("failed to read {}: {e}", path.display()))
            })?
        }
        ContentSource::Inline(text) => {
            tracing::info!("retrieving raw content specified as a string");
            text.clone()
        }
    };
    parse_fragment(&text)
}

/// Parses YAML text into a fragment mapping.
///
/// # Errors
///
/// Returns a content error if the text is not a YAML mapping.
pub fn parse_fragment(text: &str) -> Result<Mapping> {
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| CatalogError::content(format!("invalid YAML content: {e}")))?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(CatalogError::content(format!(
            "content must be a mapping, got {}",
            prodcat_core::ValueKind::of(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn parses_mapping() {
        let fragment = parse_fragment("vcs:\n  clone_url: https://example.com\n").expect("parse");
        assert_eq!(
            fragment.get("vcs").and_then(|v| v.get("clone_url")),
            Some(&Value::String("https://example.com".into()))
        );
    }

    #[test]
    fn empty_document_is_empty_mapping() {
        assert!(parse_fragment("").expect("parse").is_empty());
        assert!(parse_fragment("---\n").expect("parse").is_empty());
    }

    #[test]
    fn non_mapping_rejected() {
        let err = parse_fragment("- a\n- b\n").expect_err("sequence root");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn invalid_yaml_rejected() {
        assert!(parse_fragment("a: [unclosed").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "images:\n  sat-image:\n    id: abc").expect("write");

        let fragment = load_fragment(&ContentSource::File(file.path().to_path_buf())).expect("load");
        assert!(fragment.contains_key("images"));
    }

    #[test]
    fn missing_file_is_content_error() {
        let err = load_fragment(&ContentSource::File("/nonexistent/prodcat.yaml".into()))
            .expect_err("missing file");
        assert!(matches!(err, CatalogError::Content { .. }));
    }
}
