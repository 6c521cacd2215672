//! Update command - merge a product version's data into the catalog.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use clap::builder::FalseyValueParser;

use prodcat_catalog::{
    ConfigMapStore, ContentSource, ProductTarget, ReconcileOptions, ReconcileOutcome, Reconciler,
    UpdateConfig, run_update,
};
use prodcat_core::store::{DEFAULT_RECORD_NAME, DEFAULT_RECORD_NAMESPACE, RecordKey};

use crate::Config;

/// Arguments for the update command.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Product name.
    #[arg(long, env = "PRODUCT")]
    pub product: String,

    /// Product version.
    #[arg(long = "product-version", env = "PRODUCT_VERSION")]
    pub product_version: String,

    /// Name of the catalog ConfigMap.
    #[arg(long, env = "CONFIG_MAP", default_value = DEFAULT_RECORD_NAME)]
    pub config_map: String,

    /// Namespace of the catalog ConfigMap.
    #[arg(long, env = "CONFIG_MAP_NAMESPACE", default_value = DEFAULT_RECORD_NAMESPACE)]
    pub namespace: String,

    /// YAML file with the data to merge.
    #[arg(long, env = "YAML_CONTENT_FILE")]
    pub content_file: Option<PathBuf>,

    /// Older name for the content file.
    #[arg(long, env = "YAML_CONTENT", hide = true)]
    pub legacy_content_file: Option<PathBuf>,

    /// Inline YAML with the data to merge.
    #[arg(long, env = "YAML_CONTENT_STRING")]
    pub content: Option<String>,

    /// Mark this version active and every other version inactive.
    #[arg(long, env = "SET_ACTIVE_VERSION", value_parser = FalseyValueParser::new())]
    pub set_active: bool,

    /// Remove the active flag from every version of the product.
    #[arg(long, env = "REMOVE_ACTIVE_FIELD", value_parser = FalseyValueParser::new())]
    pub remove_active_field: bool,

    /// Replace top-level keys instead of merging them.
    #[arg(long, env = "OVERWRITE", value_parser = FalseyValueParser::new())]
    pub overwrite: bool,

    /// Validate the content against the catalog schema first.
    #[arg(long, env = "VALIDATE_SCHEMA", value_parser = FalseyValueParser::new())]
    pub validate_schema: bool,

    /// Give up after this many attempts instead of retrying indefinitely.
    #[arg(long, env = "MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,
}

impl UpdateArgs {
    /// Resolves and validates the update configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or conflicting inputs.
    pub fn to_update_config(&self) -> prodcat_catalog::Result<UpdateConfig> {
        let record = RecordKey::new(self.config_map.trim(), self.namespace.trim());
        let target = ProductTarget::new(record, &self.product, &self.product_version)?;
        let content = ContentSource::resolve(
            self.content_file.clone(),
            self.legacy_content_file.clone(),
            self.content.clone(),
        )?;
        let options = ReconcileOptions {
            set_active: self.set_active,
            clear_active: self.remove_active_field,
            overwrite: self.overwrite,
        };

        Ok(UpdateConfig::new(target, content, options)?
            .with_schema_validation(self.validate_schema)
            .with_max_attempts(self.max_attempts))
    }
}

/// Execute the update command.
///
/// # Errors
///
/// Returns an error if the inputs are invalid, the content cannot be loaded,
/// or the update cannot be completed.
pub async fn execute(args: UpdateArgs, config: &Config) -> Result<()> {
    let update = args.to_update_config()?;
    let target = &update.target;

    tracing::info!(
        record = %target.record,
        product = %target.product,
        version = %target.version,
        "updating product catalog"
    );
    if update.options.set_active {
        tracing::info!(
            product = %target.product,
            version = %target.version,
            "setting version active"
        );
    }

    let store = ConfigMapStore::new(config.kube_config()?)?;
    let reconciler = Reconciler::new(store).with_max_attempts(update.max_attempts);

    match run_update(&reconciler, &update).await? {
        ReconcileOutcome::Converged { attempts } => {
            tracing::info!(attempts, "catalog already contains the requested data");
        }
        ReconcileOutcome::Written {
            attempts,
            resource_version,
        } => {
            tracing::info!(attempts, %resource_version, "catalog updated");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: UpdateArgs,
    }

    #[test]
    fn test_update_args_parsing() {
        let cli = TestCli::parse_from([
            "test",
            "--product",
            "sat",
            "--product-version",
            "2.0.0",
            "--content",
            "images: {}",
            "--set-active",
            "--max-attempts",
            "5",
        ]);

        let update = cli.args.to_update_config().expect("config");
        assert_eq!(update.target.product, "sat");
        assert_eq!(update.target.version, "2.0.0");
        assert_eq!(update.target.record, RecordKey::default());
        assert_eq!(update.content, ContentSource::Inline("images: {}".into()));
        assert!(update.options.set_active);
        assert!(!update.options.clear_active);
        assert_eq!(update.max_attempts, Some(5));
    }

    #[test]
    fn test_conflicting_active_flags_rejected() {
        let cli = TestCli::parse_from([
            "test",
            "--product",
            "sat",
            "--product-version",
            "2.0.0",
            "--content-file",
            "sat.yaml",
            "--set-active",
            "--remove-active-field",
        ]);

        let err = cli.args.to_update_config().expect_err("conflict");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_content_required() {
        let cli = TestCli::parse_from([
            "test",
            "--product",
            "sat",
            "--product-version",
            "2.0.0",
            "--config-map",
            "catalog",
            "--namespace",
            "default",
        ]);

        assert!(cli.args.to_update_config().is_err());
    }
}
